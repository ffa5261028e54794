//! Update Triggers
//!
//! A trigger rule writes a computed value into a target when it fires, or
//! invokes an action on another component. Rules fire from four sources:
//!
//! 1. **Condition** (`triggerWhen`): the rule's boolean state variable
//!    turned from false to true at the end of a settled pass.
//! 2. **Chain** (`triggerWith`): another rule fired in this microcycle.
//!    A rule that declares its own condition is never chain-fired.
//! 3. **Event**: a click or focus was recorded on a named component.
//! 4. **External**: the host fired the rule directly. A rule with a
//!    condition only fires when that condition currently holds.
//!
//! A trigger set fires its members as one atomic unit; member rules' own
//! sources are ignored.
//!
//! # Ordering
//!
//! The registry keeps every rule in a topological order of its
//! `triggerWith` edges. Followers always fire after the rule they chain to,
//! and no rule fires twice in one microcycle. A chain cycle is reported as a
//! structural error and the rules on it are disabled.

mod registry;

pub use registry::{RuleEntry, TriggerRegistry};

use serde::{Deserialize, Serialize};

use crate::action::ActionArgs;
use crate::component::{ComponentKind, ComponentTemplate, StateVarDecl};

/// A state variable, optionally narrowed to an element path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub component: String,
    pub variable: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<usize>,
}

impl TargetRef {
    pub fn new(component: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            variable: variable.into(),
            path: Vec::new(),
        }
    }

    pub fn at_path(mut self, path: Vec<usize>) -> Self {
        self.path = path;
        self
    }
}

/// What a rule does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    /// Write the rule's `newValue` into `target`.
    UpdateValue { target: TargetRef },
    /// Perform an action on another component in the same microcycle.
    CallAction {
        component: String,
        action: String,
        args: ActionArgs,
    },
    /// Fire every member rule (the set's children) together.
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Click,
    Focus,
}

/// An external event that fires a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSource {
    pub component: String,
    pub kind: EventKind,
}

/// Declaration of a trigger rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDecl {
    pub action: TriggerAction,
    /// Rules this one fires after.
    pub trigger_with: Vec<String>,
    pub on_event: Option<EventSource>,
}

impl TriggerDecl {
    pub fn new(action: TriggerAction) -> Self {
        Self {
            action,
            trigger_with: Vec::new(),
            on_event: None,
        }
    }
}

/// Why a rule is firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireCause {
    External,
    Chain,
    Condition,
    Event,
    /// Fired as a member of a trigger set.
    Member,
}

impl ComponentTemplate {
    fn trigger_decl_mut(&mut self) -> Option<&mut TriggerDecl> {
        match &mut self.kind {
            ComponentKind::Trigger(decl) => Some(decl),
            _ => None,
        }
    }

    /// Fire after the rule named `rule` fires.
    pub fn trigger_with(mut self, rule: impl Into<String>) -> Self {
        if let Some(decl) = self.trigger_decl_mut() {
            decl.trigger_with.push(rule.into());
        }
        self
    }

    /// Fire when `condition` turns true.
    pub fn trigger_when(self, condition: StateVarDecl) -> Self {
        self.with_state("triggerWhen", condition)
    }

    /// Fire when `component` is clicked.
    pub fn on_click(mut self, component: impl Into<String>) -> Self {
        if let Some(decl) = self.trigger_decl_mut() {
            decl.on_event = Some(EventSource {
                component: component.into(),
                kind: EventKind::Click,
            });
        }
        self
    }

    /// Fire when `component` receives focus.
    pub fn on_focus(mut self, component: impl Into<String>) -> Self {
        if let Some(decl) = self.trigger_decl_mut() {
            decl.on_event = Some(EventSource {
                component: component.into(),
                kind: EventKind::Focus,
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::library;

    #[test]
    fn builders_only_touch_trigger_templates() {
        let rule = library::update_value("n", "value", StateVarDecl::constant(1.0))
            .trigger_with("r0")
            .on_click("button");
        let ComponentKind::Trigger(decl) = &rule.kind else {
            panic!("expected a trigger");
        };
        assert_eq!(decl.trigger_with, vec!["r0".to_string()]);
        assert_eq!(decl.on_event.as_ref().map(|e| e.kind), Some(EventKind::Click));

        let plain = library::group().trigger_with("r0");
        assert!(matches!(plain.kind, ComponentKind::Plain));
    }

    #[test]
    fn target_path_is_optional_in_json() {
        let target: TargetRef =
            serde_json::from_str(r#"{ "component": "p", "variable": "coords" }"#).unwrap();
        assert!(target.path.is_empty());
        assert_eq!(
            serde_json::to_string(&target.at_path(vec![1])).unwrap(),
            r#"{"component":"p","variable":"coords","path":[1]}"#
        );
    }
}
