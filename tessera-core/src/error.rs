//! Error types and diagnostics.
//!
//! Invalid values and unresolved references never escape a node as errors;
//! they become [`Value::Invalid`](crate::value::Value::Invalid) plus a logged
//! warning. The types here cover what does surface to callers: definition
//! failures (converted to the sentinel by the engine), rejected writes,
//! structural conflicts, and bad actions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure inside a state variable's definition function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    /// A dependency the definition needs evaluated to the invalid sentinel.
    #[error("dependency `{0}` is invalid")]
    InvalidDependency(String),

    /// A dependency had the wrong variant.
    #[error("expected {expected} for `{dependency}`, found {found}")]
    TypeMismatch {
        dependency: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The definition did not declare the dependency it asked for.
    #[error("no dependency named `{0}`")]
    MissingDependency(String),

    #[error("{0}")]
    Message(String),
}

/// Why a write (edit, commit, drag, trigger) was not applied.
///
/// Rejection is defined behavior: callers revert or drop, they do not fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteRejection {
    #[error("`{component}.{variable}` is fixed")]
    Fixed { component: String, variable: String },

    #[error("`{component}.{variable}` is frozen")]
    Frozen { component: String, variable: String },

    /// The target is a pure derivation with no inverse.
    #[error("`{component}.{variable}` is not writable")]
    NotWritable { component: String, variable: String },

    #[error("write target `{0}` does not resolve")]
    Unresolved(String),

    #[error("cannot write {found} into `{component}.{variable}`")]
    ShapeMismatch {
        component: String,
        variable: String,
        found: &'static str,
    },

    #[error("refusing to write an invalid value")]
    InvalidValue,

    #[error("write retargeting exceeded depth {0}")]
    TooDeep(usize),

    /// An inverse definition could not map the desired value.
    #[error("{0}")]
    Rejected(String),
}

/// Conflicts that prevent a subtree from being built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// Two replacements of one composite were assigned the same name.
    #[error("composite `{composite}` assigns the name `{name}` more than once")]
    DuplicateName { composite: String, name: String },

    /// A new component wanted a name that another component already holds.
    #[error("the name `{0}` is already in use")]
    NameTaken(String),

    /// A copy names a component that no longer exists.
    #[error("copy source `{0}` does not exist")]
    MissingSource(String),

    /// A composite would contain a copy of itself.
    #[error("composite `{composite}` cannot copy `{source_name}`, which encloses it")]
    SelfCopy {
        composite: String,
        source_name: String,
    },

    /// `triggerWith` declarations form a loop.
    #[error("trigger chain forms a cycle: {}", .rules.join(" -> "))]
    TriggerCycle { rules: Vec<String> },
}

/// Problems with an external action request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("no component named `{0}`")]
    UnknownComponent(String),

    #[error("component `{component}` has no action `{action}`")]
    UnknownAction { component: String, action: String },

    #[error("action `{action}` requires argument `{argument}`")]
    MissingArgument { action: String, argument: String },

    #[error("argument `{argument}` of `{action}` must be {expected}")]
    BadArgument {
        action: String,
        argument: String,
        expected: &'static str,
    },
}

/// Strict build failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("document has {} structural conflict(s); first: {}", .0.len(), .0.first().map(|d| d.message.as_str()).unwrap_or(""))]
    Structural(Vec<Diagnostic>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encoding failed: {0}")]
    MessagePack(#[from] rmp_serde::encode::Error),
}

/// Failures at the asynchronous host boundary.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("engine host has shut down")]
    Closed,

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("malformed request: {0}")]
    Request(#[from] serde_json::Error),
}

/// Author-facing position of a component in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A problem reported to the document loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Name of the offending component, when there is one.
    pub component: Option<String>,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            component: None,
            location: None,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message)
        }
    }

    pub fn for_component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(name.into());
        self
    }

    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<StructuralError> for Diagnostic {
    fn from(err: StructuralError) -> Self {
        Diagnostic::error(err.to_string())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}")?;
        if let Some(location) = self.location {
            write!(f, " at {location}")?;
        }
        if let Some(component) = &self.component {
            write!(f, " in `{component}`")?;
        }
        write!(f, ": {}", self.message)
    }
}

pub type Result<T, E = DefinitionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_includes_location() {
        let diag = Diagnostic::from(StructuralError::TriggerCycle {
            rules: vec!["a".into(), "b".into(), "a".into()],
        })
        .for_component("a")
        .at(Some(SourceLocation { line: 4, column: 2 }));

        assert_eq!(
            diag.to_string(),
            "error at 4:2 in `a`: trigger chain forms a cycle: a -> b -> a"
        );
    }
}
