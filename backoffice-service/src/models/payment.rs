//! Payment model for backoffice-service.

use chrono::NaiveDate;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A single payment recorded against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<i64>,
    pub client: String,
    pub invoice: String,
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_mode: Option<String>,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Input for recording a payment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayment {
    #[validate(length(min = 1, message = "invoice is required"))]
    pub invoice: String,
    /// Defaults to the invoice's client.
    pub client: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "amount must be positive"))]
    pub amount: f64,
    pub number: Option<i64>,
    pub date: Option<NaiveDate>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub payment_mode: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// Input for amending a payment. The invoice and client are fixed once recorded.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayment {
    #[validate(range(exclusive_min = 0.0, message = "amount must be positive"))]
    pub amount: Option<f64>,
    pub number: Option<i64>,
    pub date: Option<NaiveDate>,
    pub payment_mode: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl UpdatePayment {
    /// `$set` body for everything except the amount.
    pub fn descriptive_set(&self) -> Document {
        let mut set = doc! {};
        if let Some(number) = self.number {
            set.insert("number", number);
        }
        if let Some(date) = self.date {
            set.insert("date", date.to_string());
        }
        if let Some(payment_mode) = &self.payment_mode {
            set.insert("paymentMode", payment_mode);
        }
        if let Some(reference) = &self.reference {
            set.insert("ref", reference);
        }
        if let Some(description) = &self.description {
            set.insert("description", description);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_amounts_fail_validation() {
        let input: CreatePayment =
            serde_json::from_value(serde_json::json!({ "invoice": "inv-1", "amount": 0 }))
                .unwrap();
        assert!(input.validate().is_err());

        let input: CreatePayment =
            serde_json::from_value(serde_json::json!({ "invoice": "inv-1", "amount": 12.5 }))
                .unwrap();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn reference_travels_as_ref() {
        let patch: UpdatePayment =
            serde_json::from_value(serde_json::json!({ "ref": "WIRE-42" })).unwrap();
        assert_eq!(patch.descriptive_set().get_str("ref").unwrap(), "WIRE-42");
    }
}
