//! Invoice, quote and client writes.
//!
//! Totals always come from [`totals::priced`]; `credit` is never written here. Invoice
//! edits take the same per-invoice lock as the payment ledger so a re-pricing cannot
//! race a payment.

use crate::models::fields::CLIENT;
use crate::models::{
    CreateInvoice, CreateQuote, Invoice, InvoiceStatus, LineItem, NumericInput, Quote,
    QuoteStatus, UpdateInvoice, UpdateQuote,
};
use crate::outcome::Outcome;
use crate::services::ledger::InvoiceLocks;
use crate::services::totals::{self, payment_status, Totals};
use crate::store::{new_id, Collection};
use mongodb::bson::{doc, from_document, to_bson, to_document, Document};
use service_core::error::AppError;

#[derive(Clone)]
pub struct FinancialService {
    clients: Collection,
    invoices: Collection,
    quotes: Collection,
    locks: InvoiceLocks,
}

/// `$set` body for the derived money fields.
fn priced_set(items: &[LineItem], totals: &Totals) -> Result<Document, AppError> {
    Ok(doc! {
        "items": to_bson(items)?,
        "taxRate": totals.tax_rate,
        "discount": totals.discount,
        "subTotal": totals.sub_total,
        "taxTotal": totals.tax_total,
        "total": totals.total,
    })
}

impl FinancialService {
    pub fn new(
        clients: Collection,
        invoices: Collection,
        quotes: Collection,
        locks: InvoiceLocks,
    ) -> Self {
        Self {
            clients,
            invoices,
            quotes,
            locks,
        }
    }

    async fn client_exists(&self, client_id: &str) -> Result<bool, AppError> {
        Ok(self.clients.find_by_id(client_id).await?.is_some())
    }

    pub async fn create_invoice(&self, input: CreateInvoice) -> Result<Outcome<Document>, AppError> {
        if !self.client_exists(&input.client).await? {
            return Ok(Outcome::NotFound(format!("Client {} not found", input.client)));
        }

        let totals = totals::priced(&input.items, &input.tax_rate, input.discount)?;
        let invoice = Invoice {
            id: new_id(),
            number: input.number,
            year: input.year,
            client: input.client,
            date: input.date,
            expired_date: input.expired_date,
            items: input.items,
            tax_rate: totals.tax_rate,
            discount: totals.discount,
            sub_total: totals.sub_total,
            tax_total: totals.tax_total,
            total: totals.total,
            credit: 0.0,
            currency: input.currency.unwrap_or_else(|| "USD".to_string()),
            payment_status: payment_status(totals.total, totals.discount, 0.0),
            payment: Vec::new(),
            status: input.status.unwrap_or(InvoiceStatus::Draft),
            notes: input.notes,
        };

        let stored = self.invoices.insert(to_document(&invoice)?).await?;
        tracing::info!(
            invoice_id = %invoice.id,
            client_id = %invoice.client,
            total = invoice.total,
            "Invoice created"
        );
        Ok(Outcome::Created(stored))
    }

    /// Patch an invoice. Any change to items, tax rate or discount re-prices it against
    /// the stored credit.
    pub async fn update_invoice(
        &self,
        invoice_id: &str,
        patch: UpdateInvoice,
    ) -> Result<Outcome<Document>, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;

        let Some(current) = self.invoices.find_by_id(invoice_id).await? else {
            return Ok(Outcome::NotFound(format!("Invoice {} not found", invoice_id)));
        };
        let current: Invoice = from_document(current)?;

        let mut set = patch.descriptive_set();
        if patch.reprices() {
            let items = patch.items.unwrap_or(current.items);
            let tax_rate = patch
                .tax_rate
                .unwrap_or(NumericInput::Number(current.tax_rate));
            let discount = patch.discount.unwrap_or(current.discount);

            let totals = totals::priced(&items, &tax_rate, discount)?;
            let status = payment_status(totals.total, totals.discount, current.credit);
            for (key, value) in priced_set(&items, &totals)? {
                set.insert(key, value);
            }
            set.insert("paymentStatus", status.as_str());
            tracing::info!(
                invoice_id = %invoice_id,
                total = totals.total,
                credit = current.credit,
                status = status.as_str(),
                "Invoice re-priced"
            );
        }

        self.invoices
            .update_by_id(invoice_id, doc! { "$set": set })
            .await?;
        Ok(match self.invoices.find_by_id(invoice_id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("Invoice {} not found", invoice_id)),
        })
    }

    pub async fn create_quote(&self, input: CreateQuote) -> Result<Outcome<Document>, AppError> {
        if !self.client_exists(&input.client).await? {
            return Ok(Outcome::NotFound(format!("Client {} not found", input.client)));
        }

        let totals = totals::priced(&input.items, &input.tax_rate, input.discount)?;
        let quote = Quote {
            id: new_id(),
            number: input.number,
            year: input.year,
            client: input.client,
            date: input.date,
            expired_date: input.expired_date,
            items: input.items,
            tax_rate: totals.tax_rate,
            discount: totals.discount,
            sub_total: totals.sub_total,
            tax_total: totals.tax_total,
            total: totals.total,
            currency: input.currency.unwrap_or_else(|| "USD".to_string()),
            status: input.status.unwrap_or(QuoteStatus::Draft),
            notes: input.notes,
        };

        let stored = self.quotes.insert(to_document(&quote)?).await?;
        tracing::info!(quote_id = %quote.id, total = quote.total, "Quote created");
        Ok(Outcome::Created(stored))
    }

    pub async fn update_quote(
        &self,
        quote_id: &str,
        patch: UpdateQuote,
    ) -> Result<Outcome<Document>, AppError> {
        let Some(current) = self.quotes.find_by_id(quote_id).await? else {
            return Ok(Outcome::NotFound(format!("Quote {} not found", quote_id)));
        };
        let current: Quote = from_document(current)?;

        let mut set = patch.descriptive_set();
        if patch.reprices() {
            let items = patch.items.unwrap_or(current.items);
            let tax_rate = patch
                .tax_rate
                .unwrap_or(NumericInput::Number(current.tax_rate));
            let discount = patch.discount.unwrap_or(current.discount);

            let totals = totals::priced(&items, &tax_rate, discount)?;
            for (key, value) in priced_set(&items, &totals)? {
                set.insert(key, value);
            }
        }

        self.quotes
            .update_by_id(quote_id, doc! { "$set": set })
            .await?;
        Ok(match self.quotes.find_by_id(quote_id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("Quote {} not found", quote_id)),
        })
    }

    pub async fn remove_quote(&self, quote_id: &str) -> Result<Outcome<Document>, AppError> {
        if !self.quotes.soft_delete(quote_id).await? {
            return Ok(Outcome::NotFound(format!("Quote {} not found", quote_id)));
        }
        Ok(match self.quotes.find_by_id_including_removed(quote_id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("Quote {} not found", quote_id)),
        })
    }

    /// Soft-delete a client that no live invoice or quote refers to.
    pub async fn remove_client(&self, client_id: &str) -> Result<Outcome<Document>, AppError> {
        let (invoices, quotes) = futures::try_join!(
            self.invoices.count(doc! { CLIENT: client_id }),
            self.quotes.count(doc! { CLIENT: client_id }),
        )?;
        if invoices > 0 || quotes > 0 {
            return Ok(Outcome::Conflict(format!(
                "Client {} still has {} invoice(s) and {} quote(s)",
                client_id, invoices, quotes
            )));
        }

        if !self.clients.soft_delete(client_id).await? {
            return Ok(Outcome::NotFound(format!("Client {} not found", client_id)));
        }
        tracing::info!(client_id = %client_id, "Client removed");
        Ok(match self.clients.find_by_id_including_removed(client_id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound(format!("Client {} not found", client_id)),
        })
    }
}
