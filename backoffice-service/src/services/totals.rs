//! Invoice and quote arithmetic.
//!
//! Plain `f64` arithmetic with no intermediate rounding. Stored values therefore carry
//! binary floating-point drift (`0.1 + 0.2`), which display layers are expected to
//! round.

use crate::models::{LineItem, NumericInput, PaymentStatus};
use service_core::error::AppError;

/// Derived monetary fields of a priced document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub sub_total: f64,
    pub tax_rate: f64,
    pub tax_total: f64,
    pub total: f64,
    pub discount: f64,
}

impl Totals {
    /// Amount owed before any payment: `total - discount`.
    pub fn effective_due(&self) -> f64 {
        self.total - self.discount
    }

    pub fn is_finite(&self) -> bool {
        self.sub_total.is_finite()
            && self.tax_rate.is_finite()
            && self.tax_total.is_finite()
            && self.total.is_finite()
            && self.discount.is_finite()
    }
}

/// Sum line totals, apply the percentage tax rate and report the discount unchanged.
///
/// The discount is not subtracted from `total`; it only lowers the effective amount
/// due. A non-numeric `tax_rate` yields `NaN` totals which the caller must reject.
pub fn compute(items: &[LineItem], tax_rate: &NumericInput, discount: f64) -> Totals {
    let tax_rate = tax_rate.to_f64();
    let sub_total: f64 = items.iter().map(|item| item.total).sum();
    let tax_total = sub_total * tax_rate / 100.0;

    Totals {
        sub_total,
        tax_rate,
        tax_total,
        total: sub_total + tax_total,
        discount,
    }
}

/// [`compute`] for write paths: non-finite results become a bad request.
pub fn priced(items: &[LineItem], tax_rate: &NumericInput, discount: f64) -> Result<Totals, AppError> {
    let totals = compute(items, tax_rate, discount);
    if !totals.tax_rate.is_finite() {
        return Err(AppError::bad_request("taxRate must be a number"));
    }
    if !totals.is_finite() {
        return Err(AppError::bad_request("item totals must be finite numbers"));
    }
    Ok(totals)
}

/// Settlement status for an invoice. The branches are evaluated in this order, so an
/// invoice with nothing due and no credit is still unpaid.
pub fn payment_status(total: f64, discount: f64, credit: f64) -> PaymentStatus {
    let effective_due = total - discount;
    if credit <= 0.0 {
        PaymentStatus::Unpaid
    } else if credit < effective_due {
        PaymentStatus::Partially
    } else {
        PaymentStatus::Paid
    }
}

/// Largest amount that may still be credited to an invoice.
pub fn max_payable(total: f64, discount: f64, credit: f64) -> f64 {
    total - discount - credit
}
