use serde::{Deserialize, Serialize};
use validator::Validate;

/// One priced line on an invoice or quote.
///
/// `total` is supplied by the caller and trusted as-is; it is not recomputed from
/// `quantity * price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[validate(length(min = 1, message = "itemName is required"))]
    pub item_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
}

/// A number that may arrive as a JSON number or as a numeric string (`"18"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// Coerce to `f64`. Anything that is not a finite number yields `NaN`.
    pub fn to_f64(&self) -> f64 {
        match self {
            NumericInput::Number(value) => *value,
            NumericInput::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .unwrap_or(f64::NAN),
        }
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        NumericInput::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_are_coerced() {
        assert_eq!(NumericInput::from(" 18.5 ").to_f64(), 18.5);
        assert_eq!(NumericInput::from(7.0).to_f64(), 7.0);
    }

    #[test]
    fn non_numeric_strings_become_nan() {
        assert!(NumericInput::from("eighteen").to_f64().is_nan());
        assert!(NumericInput::from("").to_f64().is_nan());
        assert!(NumericInput::from("inf").to_f64().is_nan());
    }

    #[test]
    fn deserializes_from_number_or_string() {
        let number: NumericInput = serde_json::from_str("20").unwrap();
        let text: NumericInput = serde_json::from_str("\"20\"").unwrap();
        assert_eq!(number.to_f64(), text.to_f64());
    }
}
