//! Key/value settings
//!
//! The rate multiplier lives under `call_rate_multiplier` as
//! `{"multiplier": <number>}`, with optional per-client overrides.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key of the global rate multiplier
pub const RATE_MULTIPLIER_KEY: &str = "call_rate_multiplier";

/// Setting entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

/// Setting key for the multiplier of `client_id`, or the global one
pub fn rate_multiplier_key(client_id: Option<i64>) -> String {
    match client_id {
        Some(id) => format!("{}:{}", RATE_MULTIPLIER_KEY, id),
        None => RATE_MULTIPLIER_KEY.to_string(),
    }
}

/// Extract a usable multiplier from a stored value
///
/// Accepts `{"multiplier": n}` or a bare number, either as JSON numbers or
/// numeric strings. Missing, malformed and non-positive values yield `None`.
pub fn parse_multiplier(value: &Value) -> Option<Decimal> {
    let raw = value.get("multiplier").unwrap_or(value);

    let parsed = match raw {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };

    parsed.filter(|m| *m > Decimal::ZERO)
}

/// Stored representation of a multiplier
pub fn multiplier_value(multiplier: Decimal) -> Value {
    json!({ "multiplier": multiplier.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_keys() {
        assert_eq!(rate_multiplier_key(None), "call_rate_multiplier");
        assert_eq!(rate_multiplier_key(Some(42)), "call_rate_multiplier:42");
    }

    #[test]
    fn test_parse_multiplier() {
        assert_eq!(parse_multiplier(&json!({"multiplier": 2})), Some(dec!(2)));
        assert_eq!(parse_multiplier(&json!({"multiplier": 1.5})), Some(dec!(1.5)));
        assert_eq!(parse_multiplier(&json!({"multiplier": "3.25"})), Some(dec!(3.25)));
        assert_eq!(parse_multiplier(&json!(2.5)), Some(dec!(2.5)));
    }

    #[test]
    fn test_parse_multiplier_rejects_bad_values() {
        assert_eq!(parse_multiplier(&json!({"multiplier": 0})), None);
        assert_eq!(parse_multiplier(&json!({"multiplier": -1})), None);
        assert_eq!(parse_multiplier(&json!({"multiplier": "abc"})), None);
        assert_eq!(parse_multiplier(&json!({"rate": 2})), None);
        assert_eq!(parse_multiplier(&Value::Null), None);
    }

    #[test]
    fn test_multiplier_value_roundtrip() {
        let value = multiplier_value(dec!(1.75));
        assert_eq!(parse_multiplier(&value), Some(dec!(1.75)));
    }
}
