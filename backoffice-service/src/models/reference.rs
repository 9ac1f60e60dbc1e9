//! Reference data: taxes and payment modes.
//!
//! Both collections carry `enabled` and `isDefault` flags whose consistency is kept by
//! [`crate::services::defaults::DefaultManager`].

use super::line_item::NumericInput;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Tax document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tax {
    #[serde(rename = "_id")]
    pub id: String,
    pub tax_name: String,
    pub tax_value: f64,
    pub enabled: bool,
    pub is_default: bool,
}

/// Payment mode document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMode {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub is_default: bool,
}

/// Input for creating a tax.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTax {
    #[validate(length(min = 1, max = 100, message = "taxName is required"))]
    pub tax_name: String,
    pub tax_value: NumericInput,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

impl CreateTax {
    /// Build the stored document. Returns `None` when `taxValue` is not numeric.
    pub fn into_tax(self, id: String) -> Option<Tax> {
        let tax_value = self.tax_value.to_f64();
        if !tax_value.is_finite() {
            return None;
        }
        Some(Tax {
            id,
            tax_name: self.tax_name,
            tax_value,
            enabled: self.enabled.unwrap_or(true),
            is_default: self.is_default.unwrap_or(false),
        })
    }
}

/// Input for creating a payment mode.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentMode {
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

impl CreatePaymentMode {
    pub fn into_payment_mode(self, id: String) -> PaymentMode {
        PaymentMode {
            id,
            name: self.name,
            description: self.description,
            enabled: self.enabled.unwrap_or(true),
            is_default: self.is_default.unwrap_or(false),
        }
    }
}

/// Patch accepted by both reference collections.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePatch {
    #[validate(length(min = 1, max = 100))]
    pub tax_name: Option<String>,
    pub tax_value: Option<NumericInput>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub is_default: Option<bool>,
}

impl ReferencePatch {
    /// `$set` body for the supplied fields. Fails with the offending field name when a
    /// numeric field does not parse.
    pub fn to_set(&self) -> Result<Document, &'static str> {
        let mut set = doc! {};
        if let Some(tax_name) = &self.tax_name {
            set.insert("taxName", tax_name);
        }
        if let Some(tax_value) = &self.tax_value {
            let value = tax_value.to_f64();
            if !value.is_finite() {
                return Err("taxValue");
            }
            set.insert("taxValue", value);
        }
        if let Some(name) = &self.name {
            set.insert("name", name);
        }
        if let Some(description) = &self.description {
            set.insert("description", description);
        }
        if let Some(enabled) = self.enabled {
            set.insert("enabled", enabled);
        }
        if let Some(is_default) = self.is_default {
            set.insert("isDefault", is_default);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_value_must_be_numeric() {
        let input = CreateTax {
            tax_name: "VAT".to_string(),
            tax_value: NumericInput::from("twenty"),
            enabled: None,
            is_default: None,
        };
        assert!(input.into_tax("t-1".to_string()).is_none());

        let patch = ReferencePatch {
            tax_value: Some(NumericInput::from("x")),
            ..Default::default()
        };
        assert_eq!(patch.to_set().unwrap_err(), "taxValue");
    }

    #[test]
    fn new_references_are_enabled_by_default() {
        let input = CreatePaymentMode {
            name: "Wire".to_string(),
            description: None,
            enabled: None,
            is_default: None,
        };
        let mode = input.into_payment_mode("pm-1".to_string());
        assert!(mode.enabled);
        assert!(!mode.is_default);
    }
}
