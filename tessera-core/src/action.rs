//! Action Vocabulary
//!
//! External actions arrive as `(component, action, args)` triples, usually
//! as JSON from the host process. Arguments are plain JSON so hosts do not
//! need to know the engine's tagged value encoding.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ActionError, Diagnostic};
use crate::value::Value;

/// Named arguments of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionArgs(IndexMap<String, serde_json::Value>);

impl ActionArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn required(&self, action: &str, name: &str) -> Result<&serde_json::Value, ActionError> {
        self.0.get(name).ok_or_else(|| ActionError::MissingArgument {
            action: action.to_string(),
            argument: name.to_string(),
        })
    }

    pub fn number(&self, action: &str, name: &str) -> Result<f64, ActionError> {
        self.required(action, name)?
            .as_f64()
            .ok_or_else(|| ActionError::BadArgument {
                action: action.to_string(),
                argument: name.to_string(),
                expected: "a number",
            })
    }

    pub fn string(&self, action: &str, name: &str) -> Result<String, ActionError> {
        self.required(action, name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ActionError::BadArgument {
                action: action.to_string(),
                argument: name.to_string(),
                expected: "a string",
            })
    }

    /// Any argument, converted to a graph value.
    pub fn value(&self, action: &str, name: &str) -> Result<Value, ActionError> {
        Ok(json_to_value(self.required(action, name)?))
    }

    pub fn optional_string(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(|v| v.as_str()).map(str::to_string)
    }
}

/// Convert plain JSON to a graph value. Objects in the engine's own tagged
/// encoding are accepted; other objects and `null` become invalid.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Invalid, Value::Number),
        serde_json::Value::String(s) => Value::string(s.as_str()),
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(_) => {
            serde_json::from_value(json.clone()).unwrap_or(Value::Invalid)
        }
        serde_json::Value::Null => Value::Invalid,
    }
}

/// An action request as it crosses the host boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub component: String,
    pub action: String,
    #[serde(default)]
    pub args: ActionArgs,
}

impl ActionRequest {
    pub fn new(component: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            action: action.into(),
            args: ActionArgs::new(),
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args = self.args.with(name, value);
        self
    }
}

/// A parsed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RecordClick,
    RecordFocus,
    /// Generic write into a writable state variable.
    SetValue { variable: String, value: Value },
    MovePoint { x: f64, y: f64 },
    UpdateImmediateValue { text: String },
    /// Commit for inputs, fire for update rules.
    UpdateValue,
    CallAction,
    TriggerActions,
    Fire,
}

impl Action {
    pub fn parse(name: &str, args: &ActionArgs) -> Result<Self, ActionError> {
        let action = match name {
            "recordClick" => Action::RecordClick,
            "recordFocus" => Action::RecordFocus,
            "setValue" => Action::SetValue {
                variable: args.string(name, "variable")?,
                value: args.value(name, "value")?,
            },
            "movePoint" => Action::MovePoint {
                x: args.number(name, "x")?,
                y: args.number(name, "y")?,
            },
            "updateImmediateValue" => Action::UpdateImmediateValue {
                text: args.string(name, "text")?,
            },
            "updateValue" => Action::UpdateValue,
            "callAction" => Action::CallAction,
            "triggerActions" => Action::TriggerActions,
            "fire" => Action::Fire,
            _ => return Err(ActionError::UnknownAction {
                component: String::new(),
                action: name.to_string(),
            }),
        };
        Ok(action)
    }
}

/// What one microcycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub cycle: u64,
    /// Names of the trigger rules that fired, in firing order.
    pub fired: Vec<String>,
    pub created: usize,
    pub destroyed: usize,
    pub diagnostics: Vec<Diagnostic>,
}
