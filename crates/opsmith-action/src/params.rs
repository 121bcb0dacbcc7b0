//! Parameter decoding shared by action handlers.
//!
//! Handlers declare a typed params struct and decode the raw JSON bag
//! through [`decode_params`], which reports failures as field-level
//! validation errors instead of opaque serde messages.

use chrono::NaiveDate;
use opsmith_core::types::Money;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::ActionError;

/// Decode a raw parameter bag into a handler's typed params struct.
pub fn decode_params<T: DeserializeOwned>(params: &serde_json::Value) -> Result<T, ActionError> {
    serde_json::from_value(params.clone()).map_err(|e| {
        let message = e.to_string();
        ActionError::Validation {
            field: field_from_message(&message),
            message,
        }
    })
}

/// Best-effort extraction of the offending field name from a serde_json
/// error message ("missing field `amount`", "unknown field `amt`, ...").
fn field_from_message(message: &str) -> String {
    for marker in ["missing field `", "unknown field `"] {
        if let Some(rest) = message.split(marker).nth(1) {
            if let Some(field) = rest.split('`').next() {
                return field.to_string();
            }
        }
    }
    "parameters".to_string()
}

/// Money amount accepted as a JSON number of dollars or a string like
/// "45.00" or "$1,250.00".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountParam(pub Money);

impl<'de> Deserialize<'de> for AmountParam {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) => s
                .parse::<Money>()
                .map(AmountParam)
                .map_err(serde::de::Error::custom),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|dollars| AmountParam(Money::from_dollars(dollars)))
                .ok_or_else(|| serde::de::Error::custom("amount out of range")),
            _ => Err(serde::de::Error::custom(
                "expected an amount as a number or string",
            )),
        }
    }
}

/// Calendar date accepted as an ISO "YYYY-MM-DD" string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParam(pub NaiveDate);

impl<'de> Deserialize<'de> for DateParam {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse::<NaiveDate>().map(DateParam).map_err(|_| {
            serde::de::Error::custom(format!("expected a date as YYYY-MM-DD, got '{}'", s))
        })
    }
}

/// Require a strictly positive amount, naming the field in the error.
pub fn require_positive(amount: Money, field: &str) -> Result<Money, ActionError> {
    if amount.0 <= 0 {
        return Err(ActionError::validation(field, "must be a positive amount"));
    }
    Ok(amount)
}

/// Require a zero-or-positive amount, naming the field in the error.
pub fn require_non_negative(amount: Money, field: &str) -> Result<Money, ActionError> {
    if amount.is_negative() {
        return Err(ActionError::validation(field, "must not be negative"));
    }
    Ok(amount)
}

/// Require a non-blank string, returning it trimmed.
pub fn require_non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, ActionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ActionError::validation(field, "must not be empty"));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct SampleParams {
        amount: AmountParam,
        #[serde(default)]
        date: Option<DateParam>,
        description: String,
    }

    // ---- decode_params ----

    #[test]
    fn test_decode_params_ok() {
        let params: SampleParams = decode_params(&json!({
            "amount": "45.00",
            "date": "2024-03-05",
            "description": "Office chairs",
        }))
        .unwrap();
        assert_eq!(params.amount.0, Money::from_cents(4_500));
        assert_eq!(
            params.date.unwrap().0,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert_eq!(params.description, "Office chairs");
    }

    #[test]
    fn test_decode_params_missing_field_names_it() {
        let err = decode_params::<SampleParams>(&json!({"amount": 10})).unwrap_err();
        match err {
            ActionError::Validation { field, .. } => assert_eq!(field, "description"),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_decode_params_bad_type_falls_back_to_parameters() {
        let err = decode_params::<SampleParams>(&json!({
            "amount": true,
            "description": "x",
        }))
        .unwrap_err();
        match err {
            ActionError::Validation { field, .. } => assert_eq!(field, "parameters"),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    // ---- AmountParam ----

    #[test]
    fn test_amount_from_number() {
        let amount: AmountParam = serde_json::from_value(json!(45.5)).unwrap();
        assert_eq!(amount.0, Money::from_cents(4_550));
    }

    #[test]
    fn test_amount_from_string_with_symbols() {
        let amount: AmountParam = serde_json::from_value(json!("$1,250.00")).unwrap();
        assert_eq!(amount.0, Money::from_cents(125_000));
    }

    #[test]
    fn test_amount_negative_parses() {
        let amount: AmountParam = serde_json::from_value(json!("-12.30")).unwrap();
        assert_eq!(amount.0, Money::from_cents(-1_230));
    }

    #[test]
    fn test_amount_rejects_other_json_types() {
        assert!(serde_json::from_value::<AmountParam>(json!([1, 2])).is_err());
        assert!(serde_json::from_value::<AmountParam>(json!("not money")).is_err());
    }

    // ---- DateParam ----

    #[test]
    fn test_date_parses_iso() {
        let date: DateParam = serde_json::from_value(json!(" 2024-12-01 ")).unwrap();
        assert_eq!(date.0, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
    }

    #[test]
    fn test_date_rejects_other_formats() {
        assert!(serde_json::from_value::<DateParam>(json!("03/05/2024")).is_err());
        assert!(serde_json::from_value::<DateParam>(json!(20240305)).is_err());
    }

    // ---- Semantic checks ----

    #[test]
    fn test_require_positive() {
        assert!(require_positive(Money::from_cents(1), "amount").is_ok());
        assert!(require_positive(Money::ZERO, "amount").is_err());
        assert!(require_positive(Money::from_cents(-5), "amount").is_err());
    }

    #[test]
    fn test_require_non_negative() {
        assert!(require_non_negative(Money::ZERO, "tax").is_ok());
        assert!(require_non_negative(Money::from_cents(-1), "tax").is_err());
    }

    #[test]
    fn test_require_non_empty_trims() {
        assert_eq!(require_non_empty("  Acme  ", "customer_name").unwrap(), "Acme");
        let err = require_non_empty("   ", "customer_name").unwrap_err();
        assert!(err.to_string().contains("customer_name"));
    }
}
