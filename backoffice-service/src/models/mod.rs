//! Domain models for backoffice-service.

mod client;
mod invoice;
mod line_item;
mod payment;
mod quote;
mod reference;

pub use client::{Client, CreateClient, UpdateClient};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, PaymentStatus, UpdateInvoice};
pub use line_item::{LineItem, NumericInput};
pub use payment::{CreatePayment, Payment, UpdatePayment};
pub use quote::{CreateQuote, Quote, QuoteStatus, UpdateQuote};
pub use reference::{CreatePaymentMode, CreateTax, PaymentMode, ReferencePatch, Tax};

/// Field names shared by several collections.
pub mod fields {
    pub const ENABLED: &str = "enabled";
    pub const IS_DEFAULT: &str = "isDefault";
    pub const CLIENT: &str = "client";
    pub const INVOICE: &str = "invoice";
    pub const CREDIT: &str = "credit";
    pub const PAYMENT: &str = "payment";
    pub const PAYMENT_STATUS: &str = "paymentStatus";
    pub const AMOUNT: &str = "amount";
}
