//! Normalization of property read responses.

use serde_json::{Number, Value};

/// Pull the property value out of a JSON response body.
///
/// Handles the WoT `{"value": ...}` wrapper and the single-key object that
/// minimal devices return (`{"temperature": 21.5}`). Anything else is the
/// value itself.
pub fn extract_value(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            if let Some(value) = map.remove("value") {
                return value;
            }
            if map.len() != 1 {
                return Value::Object(map);
            }
            map.into_iter().next().map(|(_, value)| value).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Interpret a plain-text response body as a number when possible.
///
/// Text containing a `.` is tried as a float, anything else as an integer.
/// Integers too wide for 64 bits become the nearest float.
/// On failure the original text comes back as a JSON string.
pub fn coerce_numeric_text(text: &str) -> Value {
    let trimmed = text.trim();
    if text.contains('.') {
        if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    } else if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    } else if let Ok(int) = trimmed.parse::<u64>() {
        return Value::Number(int.into());
    } else if is_integer_literal(trimmed) {
        // wider than 64 bits
        if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(text.to_string())
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
