//! Raw Input Parsing
//!
//! Inputs receive free-form text from the host. Each input kind parses that
//! text into a candidate [`Value`]. Text that cannot be parsed, or that is
//! still incomplete (an unbalanced bracket, a trailing operator), becomes
//! [`Value::Invalid`].

use super::Value;

/// Parse a plain number. Surrounding whitespace is ignored.
pub fn parse_number(raw: &str) -> Value {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Value::Number(n),
        _ => Value::Invalid,
    }
}

/// Parse a boolean. Accepts `true`/`false` in any case.
pub fn parse_boolean(raw: &str) -> Value {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        _ => Value::Invalid,
    }
}

/// Parse math input.
///
/// Numeric literals become numbers; anything else that is syntactically
/// complete is kept as an opaque expression.
pub fn parse_math(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Invalid;
    }
    if let Value::Number(n) = parse_number(trimmed) {
        return Value::Number(n);
    }
    if is_complete_expression(trimmed) {
        Value::expression(trimmed)
    } else {
        Value::Invalid
    }
}

fn is_complete_expression(source: &str) -> bool {
    let mut stack = Vec::new();
    for c in source.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return false;
                }
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        return false;
    }
    let Some(last) = source.chars().last() else {
        return false;
    };
    let Some(first) = source.chars().next() else {
        return false;
    };
    !matches!(last, '+' | '-' | '*' | '/' | '^' | '=' | ',')
        && !matches!(first, '*' | '/' | '^' | '=' | ',')
}
