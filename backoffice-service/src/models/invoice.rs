//! Invoice model for backoffice-service.

use super::line_item::{LineItem, NumericInput};
use chrono::NaiveDate;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Workflow status of an invoice, independent of how much has been paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "sent")]
    Sent,
    #[serde(rename = "refunded")]
    Refunded,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "on hold")]
    OnHold,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Refunded => "refunded",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::OnHold => "on hold",
        }
    }
}

/// Settlement state derived from `total`, `discount` and `credit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partially,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partially => "partially",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "partially" => PaymentStatus::Partially,
            _ => PaymentStatus::Unpaid,
        }
    }
}

/// Invoice document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,
    pub number: i64,
    pub year: i32,
    pub client: String,
    pub date: NaiveDate,
    pub expired_date: NaiveDate,
    pub items: Vec<LineItem>,
    pub tax_rate: f64,
    #[serde(default)]
    pub discount: f64,
    pub sub_total: f64,
    pub tax_total: f64,
    pub total: f64,
    #[serde(default)]
    pub credit: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_status: PaymentStatus,
    /// Ids of payments recorded against this invoice, in arrival order.
    #[serde(default)]
    pub payment: Vec<String>,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

pub(crate) fn default_currency() -> String {
    "USD".to_string()
}

/// Input for creating an invoice.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoice {
    #[validate(length(min = 1, message = "client is required"))]
    pub client: String,
    #[validate(range(min = 1))]
    pub number: i64,
    #[validate(range(min = 1900, max = 9999))]
    pub year: i32,
    pub date: NaiveDate,
    pub expired_date: NaiveDate,
    #[validate(nested)]
    pub items: Vec<LineItem>,
    pub tax_rate: NumericInput,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub discount: f64,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
}

/// Input for updating an invoice.
///
/// `credit` and `paymentStatus` are owned by the payment ledger and cannot be patched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoice {
    #[validate(range(min = 1))]
    pub number: Option<i64>,
    #[validate(range(min = 1900, max = 9999))]
    pub year: Option<i32>,
    pub date: Option<NaiveDate>,
    pub expired_date: Option<NaiveDate>,
    #[validate(nested)]
    pub items: Option<Vec<LineItem>>,
    pub tax_rate: Option<NumericInput>,
    #[validate(range(min = 0.0))]
    pub discount: Option<f64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub notes: Option<String>,
}

impl UpdateInvoice {
    /// Whether the patch touches any input of the totals.
    pub fn reprices(&self) -> bool {
        self.items.is_some() || self.tax_rate.is_some() || self.discount.is_some()
    }

    /// `$set` body for the fields that do not affect totals.
    pub fn descriptive_set(&self) -> Document {
        let mut set = doc! {};
        if let Some(number) = self.number {
            set.insert("number", number);
        }
        if let Some(year) = self.year {
            set.insert("year", year);
        }
        if let Some(date) = self.date {
            set.insert("date", date.to_string());
        }
        if let Some(expired_date) = self.expired_date {
            set.insert("expiredDate", expired_date.to_string());
        }
        if let Some(currency) = &self.currency {
            set.insert("currency", currency);
        }
        if let Some(status) = self.status {
            set.insert("status", status.as_str());
        }
        if let Some(notes) = &self.notes {
            set.insert("notes", notes);
        }
        set
    }
}
