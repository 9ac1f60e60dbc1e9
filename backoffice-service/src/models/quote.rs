//! Quote model for backoffice-service.

use super::invoice::default_currency;
use super::line_item::{LineItem, NumericInput};
use chrono::NaiveDate;
use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Quote status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteStatus {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "sent")]
    Sent,
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "declined")]
    Declined,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "on hold")]
    OnHold,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "draft",
            QuoteStatus::Pending => "pending",
            QuoteStatus::Sent => "sent",
            QuoteStatus::Accepted => "accepted",
            QuoteStatus::Declined => "declined",
            QuoteStatus::Cancelled => "cancelled",
            QuoteStatus::OnHold => "on hold",
        }
    }
}

/// Quote document. Priced like an invoice but never paid against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
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
    #[serde(default = "default_currency")]
    pub currency: String,
    pub status: QuoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Input for creating a quote.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuote {
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
    pub status: Option<QuoteStatus>,
    pub notes: Option<String>,
}

/// Input for updating a quote.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuote {
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
    pub status: Option<QuoteStatus>,
    pub notes: Option<String>,
}

impl UpdateQuote {
    pub fn reprices(&self) -> bool {
        self.items.is_some() || self.tax_rate.is_some() || self.discount.is_some()
    }

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
