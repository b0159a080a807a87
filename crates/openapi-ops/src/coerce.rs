//! Loosely-typed argument coercion.
//!
//! Callers (typically LLM tool calls) send numbers as strings, booleans as `"true"`, arrays as
//! JSON text or comma lists. Each parameter value is coerced against its declared schema type
//! into a [`Coercion`]; the invoker collects these before deciding whether a call can proceed.

use crate::schema::ResolvedSchema;
use serde_json::{Number, Value};

/// Outcome of coercing one argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion {
    Coerced(Value),
    Invalid { expected: &'static str },
}

/// Coerce `value` to the type declared by `schema`.
#[must_use]
pub fn coerce_value(schema: &ResolvedSchema, value: &Value) -> Coercion {
    match schema.schema_type.as_str() {
        "integer" | "number" => coerce_number(value),
        "boolean" => coerce_boolean(value),
        "array" => Coercion::Coerced(coerce_array(value)),
        _ => Coercion::Coerced(Value::String(value_to_string(value))),
    }
}

fn coerce_number(value: &Value) -> Coercion {
    let parsed = match value {
        Value::Number(n) => return Coercion::Coerced(Value::Number(n.clone())),
        Value::String(s) => parse_number(s.trim()),
        _ => None,
    };
    match parsed {
        Some(n) => Coercion::Coerced(Value::Number(n)),
        None => Coercion::Invalid {
            expected: "a finite number",
        },
    }
}

// Integer text is parsed exactly; only fractional or exponent forms go through `f64`.
fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(number_from_f64)
}

#[allow(clippy::cast_possible_truncation)]
fn number_from_f64(f: f64) -> Option<Number> {
    // Whole numbers stay integers so they render without a trailing ".0".
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        return Some(Number::from(f as i64));
    }
    Number::from_f64(f)
}

fn coerce_boolean(value: &Value) -> Coercion {
    match value {
        Value::Bool(b) => Coercion::Coerced(Value::Bool(*b)),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Coercion::Coerced(Value::Bool(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => {
            Coercion::Coerced(Value::Bool(false))
        }
        _ => Coercion::Invalid {
            expected: "a boolean (true/false)",
        },
    }
}

fn coerce_array(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => parsed,
            _ => Value::Array(
                s.split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect(),
            ),
        },
        other => Value::Array(vec![other.clone()]),
    }
}

/// Convert a JSON value to a string for URL/header parameters.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn typed(t: &str) -> ResolvedSchema {
        ResolvedSchema::of_type(t)
    }

    #[test]
    fn numeric_strings_become_numbers() {
        assert_eq!(
            coerce_value(&typed("integer"), &json!("123")),
            Coercion::Coerced(json!(123))
        );
        assert_eq!(
            coerce_value(&typed("number"), &json!(" 1.5 ")),
            Coercion::Coerced(json!(1.5))
        );
        assert_eq!(
            coerce_value(&typed("integer"), &json!(7)),
            Coercion::Coerced(json!(7))
        );
    }

    #[test]
    fn large_integer_strings_keep_every_digit() {
        assert_eq!(
            coerce_value(&typed("integer"), &json!("1234567890123456789")),
            Coercion::Coerced(json!(1_234_567_890_123_456_789_i64))
        );
        assert_eq!(
            coerce_value(&typed("integer"), &json!("-9223372036854775808")),
            Coercion::Coerced(json!(i64::MIN))
        );
        assert_eq!(
            coerce_value(&typed("integer"), &json!("18446744073709551615")),
            Coercion::Coerced(json!(u64::MAX))
        );
        let Coercion::Coerced(Value::Number(n)) =
            coerce_value(&typed("integer"), &json!("9007199254740993"))
        else {
            panic!("expected a number");
        };
        assert_eq!(n.to_string(), "9007199254740993");
        assert_eq!(
            coerce_value(&typed("number"), &json!("1e3")),
            Coercion::Coerced(json!(1000))
        );
    }

    #[test]
    fn non_numeric_values_are_invalid_numbers() {
        for bad in [json!("abc"), json!("NaN"), json!("inf"), json!(true), json!({})] {
            assert!(
                matches!(coerce_value(&typed("integer"), &bad), Coercion::Invalid { .. }),
                "{bad} should not coerce to a number"
            );
        }
    }

    #[test]
    fn boolean_strings_round_trip() {
        for (input, expected) in [
            (json!("true"), true),
            (json!("FALSE"), false),
            (json!("True"), true),
            (json!(false), false),
        ] {
            assert_eq!(
                coerce_value(&typed("boolean"), &input),
                Coercion::Coerced(json!(expected))
            );
        }
        assert!(matches!(
            coerce_value(&typed("boolean"), &json!("yes")),
            Coercion::Invalid { .. }
        ));
    }

    #[test]
    fn arrays_accept_json_text_and_comma_lists() {
        assert_eq!(
            coerce_value(&typed("array"), &json!("[\"a\",\"b\"]")),
            Coercion::Coerced(json!(["a", "b"]))
        );
        assert_eq!(
            coerce_value(&typed("array"), &json!("a, b ,c")),
            Coercion::Coerced(json!(["a", "b", "c"]))
        );
        assert_eq!(
            coerce_value(&typed("array"), &json!([1, 2])),
            Coercion::Coerced(json!([1, 2]))
        );
    }

    #[test]
    fn other_types_are_stringified() {
        assert_eq!(
            coerce_value(&typed("string"), &json!(42)),
            Coercion::Coerced(json!("42"))
        );
        assert_eq!(
            coerce_value(&typed("object"), &json!({"a": 1})),
            Coercion::Coerced(json!("{\"a\":1}"))
        );
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("hello")), "hello");
        assert_eq!(value_to_string(&json!(123)), "123");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(null)), "");
    }
}
