//! Values
//!
//! Every state variable in the graph holds a [`Value`]. Values are immutable
//! once produced: a recomputation replaces the cached value rather than
//! mutating it in place.
//!
//! # Invalid Values
//!
//! A definition that cannot produce a result (malformed input, a missing
//! reference, a type mismatch) yields [`Value::Invalid`]. The sentinel is
//! ordinary data: it is cached, compared and propagated like any other
//! value, so downstream consumers degrade instead of failing.

mod format;
mod parse;

pub use format::{format_for_display, round_for_display, DisplayPolicy};
pub use parse::{parse_boolean, parse_math, parse_number};

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque expression payload.
///
/// Symbolic evaluation happens outside the engine; the engine only stores,
/// compares and forwards the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression(String);

impl Expression {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

/// A tagged payload stored in a state variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Expression(Expression),
    /// An ordered, variable-length sequence.
    List(Vec<Value>),
    /// A fixed-arity grouping such as point coordinates.
    Tuple(Vec<Value>),
    /// Produced when a definition cannot compute a value.
    Invalid,
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn expression(source: impl Into<String>) -> Self {
        Value::Expression(Expression::new(source))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Expression(_) => "expression",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Invalid => "invalid",
        }
    }

    /// Numeric view of the value.
    ///
    /// Expressions whose source is a plain number literal are accepted, since
    /// math inputs frequently produce those.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Expression(e) => e.source().trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Follow an index path into nested lists and tuples.
    pub fn get_path(&self, path: &[usize]) -> Option<&Value> {
        let mut current = self;
        for &index in path {
            current = current.elements()?.get(index)?;
        }
        Some(current)
    }

    /// Return a copy with the element at `path` replaced.
    ///
    /// Returns `None` when the path does not resolve. An empty path replaces
    /// the whole value.
    pub fn with_path(&self, path: &[usize], replacement: Value) -> Option<Value> {
        let Some((&first, rest)) = path.split_first() else {
            return Some(replacement);
        };
        match self {
            Value::List(items) => {
                let updated = items.get(first)?.with_path(rest, replacement)?;
                let mut items = items.clone();
                items[first] = updated;
                Some(Value::List(items))
            }
            Value::Tuple(items) => {
                let updated = items.get(first)?.with_path(rest, replacement)?;
                let mut items = items.clone();
                items[first] = updated;
                Some(Value::Tuple(items))
            }
            _ => None,
        }
    }

    /// Whether a write of `other` into a slot currently holding `self` keeps
    /// the slot's shape. Invalid slots accept anything.
    pub fn same_shape(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Invalid, _) => true,
            (Value::Number(_), Value::Expression(_)) | (Value::Expression(_), Value::Number(_)) => {
                true
            }
            (Value::Tuple(a), Value::Tuple(b)) => a.len() == b.len(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Expression(e) => f.write_str(e.source()),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Invalid => f.write_str("\u{FF3F}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_access_and_replace() {
        let coords = Value::Tuple(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(coords.get_path(&[1]), Some(&Value::Number(2.0)));
        assert_eq!(coords.get_path(&[2]), None);

        let moved = coords.with_path(&[0], Value::Number(5.0)).unwrap();
        assert_eq!(
            moved,
            Value::Tuple(vec![Value::Number(5.0), Value::Number(2.0)])
        );
        assert!(coords.with_path(&[0, 0], Value::Number(1.0)).is_none());
    }

    #[test]
    fn numeric_expressions_read_as_numbers() {
        assert_eq!(Value::expression(" 12 ").as_f64(), Some(12.0));
        assert_eq!(Value::expression("x+1").as_f64(), None);
    }

    #[test]
    fn shape_checks() {
        let pair = Value::Tuple(vec![Value::Number(0.0), Value::Number(0.0)]);
        let triple = Value::Tuple(vec![Value::Number(0.0); 3]);
        assert!(!pair.same_shape(&triple));
        assert!(Value::Number(1.0).same_shape(&Value::expression("x")));
        assert!(!Value::Number(1.0).same_shape(&Value::string("1")));
        assert!(Value::Invalid.same_shape(&Value::Boolean(true)));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&Value::Number(3.0)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":3.0}"#);
        let back: Value = serde_json::from_str(r#"{"type":"invalid"}"#).unwrap();
        assert!(back.is_invalid());
    }
}
