//! Lenient scalar coercion for JSON literals.
//!
//! Generation tools disagree on whether numbers are stored as JSON numbers or
//! numeric strings, so both are accepted everywhere.

use serde_json::Value;

/// Non-empty trimmed string content of a JSON string.
pub fn json_str(value: &Value) -> Option<&str> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// String form of a scalar (string, number or bool).
pub fn json_scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => json_str(value).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn json_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Non-negative integer; integral floats such as `20.0` are accepted.
pub fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub fn json_u32(value: &Value) -> Option<u32> {
    json_u64(value).and_then(|n| u32::try_from(n).ok())
}
