//! Payment ledger.
//!
//! Every payment write is a read-modify-write of `invoice.credit`, so all of them run
//! inside a per-invoice critical section ([`InvoiceLocks`]). A write that fails halfway
//! is compensated before the lock is released: either the payment and the invoice both
//! change, or neither does.

use crate::models::fields::{AMOUNT, CREDIT, INVOICE, PAYMENT, PAYMENT_STATUS};
use crate::models::{CreatePayment, Payment, PaymentStatus, UpdatePayment};
use crate::outcome::{Outcome, Payload};
use crate::services::metrics::record_ledger_operation;
use crate::services::totals::{max_payable, payment_status};
use crate::store::{matcher, new_id, Collection, ID, REMOVED};
use dashmap::DashMap;
use mongodb::bson::{doc, from_document, to_document, Document};
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-invoice async mutexes. Entries are dropped once no task holds or awaits them.
#[derive(Clone, Default)]
pub struct InvoiceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, invoice_id: &str) -> InvoiceGuard {
        let lock = self
            .locks
            .entry(invoice_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        InvoiceGuard {
            invoice_id: invoice_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of invoices with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

pub struct InvoiceGuard {
    invoice_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InvoiceGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.invoice_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// The slice of an invoice the ledger reasons about.
#[derive(Debug, Clone, Deserialize)]
struct Balance {
    #[serde(rename = "_id")]
    id: String,
    client: String,
    total: f64,
    #[serde(default)]
    discount: f64,
    #[serde(default)]
    credit: f64,
    #[serde(rename = "paymentStatus")]
    payment_status: PaymentStatus,
}

impl Balance {
    fn max_payable(&self) -> f64 {
        max_payable(self.total, self.discount, self.credit)
    }

    fn status_with_credit(&self, credit: f64) -> PaymentStatus {
        payment_status(self.total, self.discount, credit)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PaymentEntry {
    invoice: String,
    amount: f64,
}

fn over_limit(max_amount: f64) -> String {
    format!("The max amount you can add is {}", max_amount)
}

#[derive(Clone)]
pub struct PaymentLedger {
    invoices: Collection,
    payments: Collection,
    locks: InvoiceLocks,
}

impl PaymentLedger {
    pub fn new(invoices: Collection, payments: Collection, locks: InvoiceLocks) -> Self {
        Self {
            invoices,
            payments,
            locks,
        }
    }

    async fn balance(&self, invoice_id: &str) -> Result<Option<Balance>, AppError> {
        match self.invoices.find_by_id(invoice_id).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Invoice of a payment that is already on record. Its absence means the ledger is
    /// inconsistent, which is an error rather than a business outcome.
    async fn owning_invoice(&self, payment_id: &str, invoice_id: &str) -> Result<Balance, AppError> {
        self.balance(invoice_id).await?.ok_or_else(|| {
            tracing::error!(
                payment_id = %payment_id,
                invoice_id = %invoice_id,
                "Payment references a missing or removed invoice"
            );
            AppError::NotFound(anyhow::anyhow!(
                "Invoice {} of payment {} not found",
                invoice_id,
                payment_id
            ))
        })
    }

    /// Apply `delta` to the invoice credit and store the re-derived status.
    async fn adjust_credit(
        &self,
        invoice: &Balance,
        delta: f64,
        push_payment: Option<&str>,
    ) -> Result<bool, AppError> {
        let status = invoice.status_with_credit(invoice.credit + delta);
        let mut update = doc! {
            "$inc": { CREDIT: delta },
            "$set": { PAYMENT_STATUS: status.as_str() },
        };
        if let Some(payment_id) = push_payment {
            update.insert("$push", doc! { PAYMENT: payment_id });
        }
        self.invoices.update_by_id(&invoice.id, update).await
    }

    /// Undo an [`adjust_credit`](Self::adjust_credit) after a later step failed.
    async fn restore_credit(&self, invoice: &Balance, delta: f64) {
        let update = doc! {
            "$inc": { CREDIT: -delta },
            "$set": { PAYMENT_STATUS: invoice.payment_status.as_str() },
        };
        if let Err(e) = self.invoices.update_by_id(&invoice.id, update).await {
            tracing::error!(
                invoice_id = %invoice.id,
                delta = delta,
                "Failed to restore invoice credit after a failed payment write: {}",
                e
            );
        }
    }

    /// Record a payment and credit it to its invoice.
    pub async fn create(&self, input: CreatePayment) -> Result<Outcome<Document>, AppError> {
        if !(input.amount.is_finite() && input.amount > 0.0) {
            return Err(AppError::bad_request("amount must be a positive number"));
        }

        let _guard = self.locks.acquire(&input.invoice).await;

        let Some(invoice) = self.balance(&input.invoice).await? else {
            record_ledger_operation("create", "not_found");
            return Ok(Outcome::NotFound(format!(
                "Invoice {} not found",
                input.invoice
            )));
        };

        let max_amount = invoice.max_payable();
        if input.amount > max_amount {
            tracing::info!(
                invoice_id = %invoice.id,
                amount = input.amount,
                max_amount = max_amount,
                "Payment rejected: amount exceeds what is owed"
            );
            record_ledger_operation("create", "over_limit");
            return Ok(Outcome::OverLimit(over_limit(max_amount)));
        }

        let payment = Payment {
            id: new_id(),
            number: input.number,
            client: input.client.unwrap_or_else(|| invoice.client.clone()),
            invoice: invoice.id.clone(),
            date: input
                .date
                .unwrap_or_else(|| chrono::Utc::now().date_naive()),
            amount: input.amount,
            currency: input.currency,
            payment_mode: input.payment_mode,
            reference: input.reference,
            description: input.description,
        };
        let stored = self.payments.insert(to_document(&payment)?).await?;

        let credited = self
            .adjust_credit(&invoice, payment.amount, Some(&payment.id))
            .await;
        match credited {
            Ok(true) => {}
            Ok(false) => {
                self.discard_payment(&payment.id).await;
                record_ledger_operation("create", "not_found");
                return Ok(Outcome::NotFound(format!(
                    "Invoice {} not found",
                    invoice.id
                )));
            }
            Err(e) => {
                self.discard_payment(&payment.id).await;
                record_ledger_operation("create", "failed");
                return Err(e);
            }
        }

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            amount = payment.amount,
            "Payment recorded"
        );
        record_ledger_operation("create", "ok");
        Ok(Outcome::Created(stored))
    }

    async fn discard_payment(&self, payment_id: &str) {
        if let Err(e) = self.payments.purge(payment_id).await {
            tracing::error!(
                payment_id = %payment_id,
                "Failed to roll back payment after invoice update failed: {}",
                e
            );
        }
    }

    /// Amend a payment. Only the difference to the old amount counts against the
    /// invoice's remaining balance.
    pub async fn update(
        &self,
        payment_id: &str,
        patch: UpdatePayment,
    ) -> Result<Outcome<Document>, AppError> {
        if let Some(amount) = patch.amount {
            if !(amount.is_finite() && amount > 0.0) {
                return Err(AppError::bad_request("amount must be a positive number"));
            }
        }

        let Some(existing) = self.payments.find_by_id(payment_id).await? else {
            record_ledger_operation("update", "not_found");
            return Ok(Outcome::NotFound("Payment not found".to_string()));
        };
        let invoice_id = existing.get_str(INVOICE).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("payment {} has no invoice: {}", payment_id, e))
        })?;

        let _guard = self.locks.acquire(invoice_id).await;

        // Re-read under the lock; a concurrent delete may have won.
        let Some(existing) = self.payments.find_by_id(payment_id).await? else {
            record_ledger_operation("update", "not_found");
            return Ok(Outcome::NotFound("Payment not found".to_string()));
        };
        let entry: PaymentEntry = from_document(existing)?;
        let invoice = self.owning_invoice(payment_id, &entry.invoice).await?;

        let new_amount = patch.amount.unwrap_or(entry.amount);
        let changed = new_amount - entry.amount;
        let max_amount = invoice.max_payable();
        if changed > max_amount {
            tracing::info!(
                payment_id = %payment_id,
                invoice_id = %invoice.id,
                changed = changed,
                max_amount = max_amount,
                "Payment update rejected: change exceeds what is owed"
            );
            record_ledger_operation("update", "over_limit");
            return Ok(Outcome::OverLimit(over_limit(max_amount)));
        }

        if !self.adjust_credit(&invoice, changed, None).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} of payment {} not found",
                invoice.id,
                payment_id
            )));
        }

        let mut set = patch.descriptive_set();
        set.insert(AMOUNT, new_amount);
        match self.payments.update_by_id(payment_id, doc! { "$set": set }).await {
            Ok(true) => {}
            Ok(false) => {
                self.restore_credit(&invoice, changed).await;
                record_ledger_operation("update", "not_found");
                return Ok(Outcome::NotFound("Payment not found".to_string()));
            }
            Err(e) => {
                self.restore_credit(&invoice, changed).await;
                record_ledger_operation("update", "failed");
                return Err(e);
            }
        }

        tracing::info!(
            payment_id = %payment_id,
            invoice_id = %invoice.id,
            amount = new_amount,
            changed = changed,
            "Payment updated"
        );
        record_ledger_operation("update", "ok");
        self.payment_outcome(payment_id).await
    }

    /// Soft-delete a payment and take its amount back off the invoice. The invoice keeps
    /// the payment id in its `payment` list.
    pub async fn remove(&self, payment_id: &str) -> Result<Outcome<Document>, AppError> {
        let Some(existing) = self.payments.find_by_id(payment_id).await? else {
            record_ledger_operation("delete", "not_found");
            return Ok(Outcome::NotFound("Payment not found".to_string()));
        };
        let invoice_id = existing.get_str(INVOICE).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("payment {} has no invoice: {}", payment_id, e))
        })?;

        let _guard = self.locks.acquire(invoice_id).await;

        let Some(existing) = self.payments.find_by_id(payment_id).await? else {
            record_ledger_operation("delete", "not_found");
            return Ok(Outcome::NotFound("Payment not found".to_string()));
        };
        let entry: PaymentEntry = from_document(existing)?;
        let invoice = self.owning_invoice(payment_id, &entry.invoice).await?;

        if !self.adjust_credit(&invoice, -entry.amount, None).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Invoice {} of payment {} not found",
                invoice.id,
                payment_id
            )));
        }

        match self.payments.soft_delete(payment_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.restore_credit(&invoice, -entry.amount).await;
                record_ledger_operation("delete", "not_found");
                return Ok(Outcome::NotFound("Payment not found".to_string()));
            }
            Err(e) => {
                self.restore_credit(&invoice, -entry.amount).await;
                record_ledger_operation("delete", "failed");
                return Err(e);
            }
        }

        tracing::info!(
            payment_id = %payment_id,
            invoice_id = %invoice.id,
            amount = entry.amount,
            "Payment removed"
        );
        record_ledger_operation("delete", "ok");

        match self.payments.find_by_id_including_removed(payment_id).await? {
            Some(document) => Ok(Outcome::Ok(document)),
            None => Ok(Outcome::NotFound("Payment not found".to_string())),
        }
    }

    /// Soft-delete an invoice together with its payments, serialized with payment writes.
    pub async fn remove_invoice(&self, invoice_id: &str) -> Result<Outcome<Document>, AppError> {
        let _guard = self.locks.acquire(invoice_id).await;

        if !self.invoices.soft_delete(invoice_id).await? {
            return Ok(Outcome::NotFound(format!("Invoice {} not found", invoice_id)));
        }
        let payments = self
            .payments
            .update_many(
                doc! { INVOICE: invoice_id },
                doc! { "$set": { REMOVED: true } },
            )
            .await?;
        tracing::info!(invoice_id = %invoice_id, payments = payments, "Invoice removed");

        match self.invoices.find_by_id_including_removed(invoice_id).await? {
            Some(document) => Ok(Outcome::Ok(document)),
            None => Ok(Outcome::NotFound(format!("Invoice {} not found", invoice_id))),
        }
    }

    async fn payment_outcome(&self, payment_id: &str) -> Result<Outcome<Document>, AppError> {
        Ok(match self.payments.find_by_id(payment_id).await? {
            Some(document) => Outcome::Ok(document),
            None => Outcome::NotFound("Payment not found".to_string()),
        })
    }

    /// Invoice counts and amounts per payment status, plus what is still owed on unpaid
    /// and partially paid invoices.
    pub async fn breakdown(&self) -> Result<Outcome<Breakdown>, AppError> {
        let rows = self
            .invoices
            .aggregate(vec![doc! {
                "$group": {
                    "_id": "$paymentStatus",
                    "count": { "$sum": 1 },
                    "total": { "$sum": "$total" },
                    "discount": { "$sum": "$discount" },
                    "credit": { "$sum": "$credit" },
                }
            }])
            .await?;
        if rows.is_empty() {
            return Ok(Outcome::Empty);
        }

        let mut breakdown = Breakdown::default();
        for row in rows {
            let status = PaymentStatus::from_string(row.get_str(ID).unwrap_or_default());
            let number = |field: &str| {
                row.get(field)
                    .and_then(matcher::as_f64)
                    .unwrap_or(0.0)
            };
            let share = StatusShare {
                status,
                count: number("count") as u64,
                total: number("total"),
                credit: number("credit"),
            };
            if status != PaymentStatus::Paid {
                breakdown.outstanding += number("total") - number("discount") - number("credit");
            }
            breakdown.statuses.push(share);
        }
        breakdown
            .statuses
            .sort_by_key(|share| share.status.as_str());
        Ok(Outcome::Ok(breakdown))
    }

    /// Sum of non-removed payment amounts for one invoice.
    pub async fn paid_total(&self, invoice_id: &str) -> Result<f64, AppError> {
        let rows = self
            .payments
            .aggregate(vec![
                doc! { "$match": { INVOICE: invoice_id } },
                doc! { "$group": { "_id": "$invoice", "amount": { "$sum": "$amount" } } },
            ])
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(AMOUNT))
            .and_then(matcher::as_f64)
            .unwrap_or(0.0))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusShare {
    pub status: PaymentStatus,
    pub count: u64,
    pub total: f64,
    pub credit: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Breakdown {
    pub statuses: Vec<StatusShare>,
    pub outstanding: f64,
}

impl Payload for Breakdown {
    fn into_json(self) -> Value {
        let statuses: Vec<Value> = self
            .statuses
            .into_iter()
            .map(|share| {
                json!({
                    "paymentStatus": share.status,
                    "count": share.count,
                    "total": share.total,
                    "credit": share.credit,
                })
            })
            .collect();
        json!({ "statuses": statuses, "outstanding": self.outstanding })
    }
}
