//! Two-Stage Inputs
//!
//! An input pairs a free-running *immediate* value (what the reader is
//! typing) with a *committed* value (what the rest of the document sees).
//! Both live in the graph as ordinary state variables:
//!
//! | variable | kind | meaning |
//! |---|---|---|
//! | `value` | essential, or derived from the bound target | committed value |
//! | `rawImmediateValue` | essential, hidden | last parsed preview edit |
//! | `immediateValueChanged` | essential | a preview edit is pending |
//! | `valueChanged` | essential | a commit has succeeded at least once |
//! | `immediateValue` | derived | pending edit if any, else `value` |
//!
//! An unbound input owns its `value`. A bound input's `value` is a pure
//! derivation of its target with an inverse, so a commit becomes a write
//! request that the target may reject. After a rejected commit the pending
//! flag is cleared and `immediateValue` falls back to `value`, which
//! re-reads the live target.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentKind, ComponentTemplate, DependencySpec, StateVarDecl};
use crate::error::WriteRejection;
use crate::trigger::TargetRef;
use crate::value::{parse_boolean, parse_math, parse_number, Value};

/// What an input accepts and how raw text is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    Text,
    Math,
    Number,
    Boolean,
}

impl InputKind {
    /// Parse raw preview text. Incomplete or malformed input yields the
    /// invalid sentinel.
    pub fn parse(&self, raw: &str) -> Value {
        match self {
            InputKind::Text => Value::string(raw),
            InputKind::Math => parse_math(raw),
            InputKind::Number => parse_number(raw),
            InputKind::Boolean => parse_boolean(raw),
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            InputKind::Text => Value::string(""),
            InputKind::Boolean => Value::Boolean(false),
            InputKind::Math | InputKind::Number => Value::Invalid,
        }
    }
}

/// Declaration of a two-stage input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputDecl {
    pub kind: InputKind,
    /// Target whose value the input edits. `None` makes the input its own
    /// essential storage.
    pub bind: Option<TargetRef>,
    pub initial: Option<Value>,
}

impl InputDecl {
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            bind: None,
            initial: None,
        }
    }

    fn initial_value(&self) -> Value {
        self.initial
            .clone()
            .unwrap_or_else(|| self.kind.default_value())
    }

    /// The state variables every input carries.
    pub(crate) fn state_decls(&self) -> Vec<(&'static str, StateVarDecl)> {
        let value = match &self.bind {
            None => StateVarDecl::essential(self.initial_value()),
            Some(target) => bound_value(target),
        };
        vec![
            ("value", value),
            (
                "rawImmediateValue",
                StateVarDecl::essential(self.initial_value()).hidden(),
            ),
            ("immediateValueChanged", StateVarDecl::essential(false)),
            ("valueChanged", StateVarDecl::essential(false)),
            (
                "immediateValue",
                StateVarDecl::derived(|deps| {
                    if deps.boolean("changed")? {
                        Ok(deps.get("raw")?.clone())
                    } else {
                        Ok(deps.get("value")?.clone())
                    }
                })
                .depends_on("raw", DependencySpec::sibling("rawImmediateValue"))
                .depends_on("changed", DependencySpec::sibling("immediateValueChanged"))
                .depends_on("value", DependencySpec::sibling("value")),
            ),
        ]
    }
}

/// `value` of a bound input: the target (or an element of it) with an
/// inverse that writes the edited element back.
fn bound_value(target: &TargetRef) -> StateVarDecl {
    let source = DependencySpec::component(&target.component, &target.variable);
    if target.path.is_empty() {
        return StateVarDecl::passthrough(source);
    }
    let read_path = target.path.clone();
    let write_path = target.path.clone();
    StateVarDecl::derived(move |deps| {
        Ok(deps
            .get("source")?
            .get_path(&read_path)
            .cloned()
            .unwrap_or(Value::Invalid))
    })
    .depends_on("source", source)
    .with_inverse(move |desired, deps| {
        let current = deps
            .get("source")
            .map_err(|err| WriteRejection::Rejected(err.to_string()))?;
        let updated = current
            .with_path(&write_path, desired.clone())
            .ok_or_else(|| WriteRejection::Rejected(format!("path {write_path:?} does not resolve")))?;
        Ok(vec![("source".to_string(), updated)])
    })
}

impl ComponentTemplate {
    /// Bind an input to `component.variable`.
    ///
    /// Has no effect on templates that are not inputs.
    pub fn bind_to(mut self, component: impl Into<String>, variable: impl Into<String>) -> Self {
        if let ComponentKind::Input(decl) = &mut self.kind {
            decl.bind = Some(TargetRef::new(component, variable));
        }
        self
    }

    /// Bind an input to one element of a list or tuple variable.
    pub fn bind_to_element(
        mut self,
        component: impl Into<String>,
        variable: impl Into<String>,
        path: Vec<usize>,
    ) -> Self {
        if let ComponentKind::Input(decl) = &mut self.kind {
            decl.bind = Some(TargetRef::new(component, variable).at_path(path));
        }
        self
    }

    /// Initial value of an unbound input.
    pub fn prefill(mut self, value: impl Into<Value>) -> Self {
        if let ComponentKind::Input(decl) = &mut self.kind {
            decl.initial = Some(value.into());
        }
        self
    }
}

/// Where an input is in its preview/commit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputPhase {
    /// No edit has been made or committed.
    Empty,
    /// A preview edit is pending.
    Uncommitted,
    /// The last edit was committed.
    Committed,
}

/// Settled view of an input's two stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoStageState {
    pub immediate_value: Value,
    pub committed_value: Value,
    pub immediate_changed: bool,
    pub committed_changed: bool,
}

impl TwoStageState {
    pub fn phase(&self) -> InputPhase {
        if self.immediate_changed {
            InputPhase::Uncommitted
        } else if self.committed_changed {
            InputPhase::Committed
        } else {
            InputPhase::Empty
        }
    }
}
