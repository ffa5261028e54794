//! Display Formatting
//!
//! Numeric state variables expose a display form derived from the raw value
//! and an inherited [`DisplayPolicy`]. The raw value is never modified; only
//! the derived `valueForDisplay` is rounded.

use serde::{Deserialize, Serialize};

use super::Value;

/// Rounding policy applied when numbers are shown to a reader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplayPolicy {
    /// Significant digits to keep.
    pub digits: Option<u32>,
    /// Digits to keep after the decimal point.
    pub decimals: Option<i32>,
    /// Magnitudes below this threshold display as zero. Zero disables it.
    pub small_as_zero: f64,
}

impl Default for DisplayPolicy {
    fn default() -> Self {
        Self {
            digits: Some(10),
            decimals: None,
            small_as_zero: 1e-14,
        }
    }
}

impl DisplayPolicy {
    /// Encode the policy as a graph value so it can be inherited through
    /// ordinary dependencies: `(digits, decimals, smallAsZero)`, with unset
    /// fields as the invalid sentinel.
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            self.digits
                .map_or(Value::Invalid, |d| Value::Number(f64::from(d))),
            self.decimals
                .map_or(Value::Invalid, |d| Value::Number(f64::from(d))),
            Value::Number(self.small_as_zero),
        ])
    }

    /// Decode a value produced by [`DisplayPolicy::to_value`].
    pub fn from_value(value: &Value) -> Option<Self> {
        let Value::Tuple(fields) = value else {
            return None;
        };
        let [digits, decimals, small_as_zero] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            digits: digits.as_f64().map(|d| d.max(1.0) as u32),
            decimals: decimals.as_f64().map(|d| d as i32),
            small_as_zero: small_as_zero.as_f64()?,
        })
    }
}

/// `10^exp` for a non-negative exponent.
fn pow10(exp: i32) -> f64 {
    10f64.powi(exp)
}

/// Round `x` to a multiple of `10^-places` without dividing by an inexact
/// power of ten.
/// Past the range of `f64` the factor overflows; `x` is returned as is.
fn round_to_place(x: f64, places: i32) -> f64 {
    let factor = pow10(places.saturating_abs());
    if !factor.is_finite() {
        return x;
    }
    let rounded = if places >= 0 {
        let scaled = x * factor;
        if !scaled.is_finite() {
            return x;
        }
        scaled.round() / factor
    } else {
        (x / factor).round() * factor
    };
    if rounded.is_finite() {
        rounded
    } else {
        x
    }
}

fn round_to_digits(x: f64, digits: u32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let magnitude = x.abs().log10().floor() as i32;
    round_to_place(x, digits.max(1) as i32 - 1 - magnitude)
}

/// Round a single number according to `policy`.
///
/// When both digits and decimals are set, the rounding with the smaller
/// error wins.
pub fn round_for_display(x: f64, policy: &DisplayPolicy) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if policy.small_as_zero > 0.0 && x.abs() < policy.small_as_zero {
        return 0.0;
    }
    let by_digits = policy.digits.map(|d| round_to_digits(x, d));
    let by_decimals = policy.decimals.map(|d| round_to_place(x, d));
    let rounded = match (by_digits, by_decimals) {
        (Some(a), Some(b)) => {
            if (a - x).abs() <= (b - x).abs() {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => x,
    };
    // -0.0 displays as "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Apply `policy` to every number inside `value`.
pub fn format_for_display(value: &Value, policy: &DisplayPolicy) -> Value {
    match value {
        Value::Number(n) => Value::Number(round_for_display(*n, policy)),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| format_for_display(item, policy))
                .collect(),
        ),
        Value::Tuple(items) => Value::Tuple(
            items
                .iter()
                .map(|item| format_for_display(item, policy))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits(d: u32) -> DisplayPolicy {
        DisplayPolicy {
            digits: Some(d),
            decimals: None,
            small_as_zero: 0.0,
        }
    }

    #[test]
    fn rounds_to_significant_digits() {
        assert_eq!(round_for_display(3.14159265, &digits(5)), 3.1416);
        assert_eq!(round_for_display(123456.0, &digits(3)), 123000.0);
        assert_eq!(round_for_display(-0.000123456, &digits(2)), -0.00012);
    }

    #[test]
    fn decimals_and_digits_pick_higher_precision() {
        let policy = DisplayPolicy {
            digits: Some(2),
            decimals: Some(3),
            small_as_zero: 0.0,
        };
        // two digits gives 1200, three decimals keeps 1234.568
        assert_eq!(round_for_display(1234.5678, &policy), 1234.568);
        // for tiny numbers the significant digits win
        assert_eq!(round_for_display(0.000123, &policy), 0.00012);
    }

    #[test]
    fn small_values_display_as_zero() {
        let policy = DisplayPolicy::default();
        assert_eq!(round_for_display(1e-15, &policy), 0.0);
        assert_eq!(round_for_display(-1e-20, &policy), 0.0);
        assert_ne!(round_for_display(2e-14, &policy), 0.0);
    }

    #[test]
    fn tiny_values_survive_without_threshold() {
        let policy = DisplayPolicy {
            small_as_zero: 0.0,
            ..DisplayPolicy::default()
        };
        let tiny = round_for_display(1e-300, &policy);
        assert!((tiny - 1e-300).abs() < 1e-310);
        assert_eq!(round_for_display(-4.9e-324, &policy), -4.9e-324);
        assert!(round_for_display(1.234567e-290, &digits(3)).is_finite());
    }

    #[test]
    fn huge_precision_leaves_values_alone() {
        assert_eq!(round_for_display(3.14159, &digits(400)), 3.14159);
        let policy = DisplayPolicy {
            digits: None,
            decimals: Some(400),
            small_as_zero: 0.0,
        };
        assert_eq!(round_for_display(2.5, &policy), 2.5);
        assert_eq!(round_for_display(1e300, &digits(400)), 1e300);
    }

    #[test]
    fn formats_nested_values() {
        let value = Value::Tuple(vec![Value::Number(1.23456), Value::string("a")]);
        assert_eq!(
            format_for_display(&value, &digits(3)),
            Value::Tuple(vec![Value::Number(1.23), Value::string("a")])
        );
    }

    #[test]
    fn policy_survives_graph_encoding() {
        let policy = DisplayPolicy {
            digits: None,
            decimals: Some(2),
            small_as_zero: 1e-10,
        };
        assert_eq!(DisplayPolicy::from_value(&policy.to_value()), Some(policy));
        assert_eq!(DisplayPolicy::from_value(&Value::Number(3.0)), None);
    }
}
