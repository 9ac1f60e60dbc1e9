//! Payment write routes. Every one of them goes through the ledger.

use crate::models::{CreatePayment, UpdatePayment};
use crate::outcome::Outcome;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, patch, post},
    Json, Router,
};
use mongodb::bson::Document;
use service_core::error::AppError;
use validator::Validate;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/update/:id", patch(update))
        .route("/delete/:id", delete(remove))
}

#[tracing::instrument(skip_all, fields(invoice_id = %input.invoice, amount = input.amount))]
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreatePayment>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;
    state.ledger.create(input).await
}

#[tracing::instrument(skip_all, fields(payment_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdatePayment>,
) -> Result<Outcome<Document>, AppError> {
    patch.validate()?;
    state.ledger.update(&id, patch).await
}

#[tracing::instrument(skip_all, fields(payment_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    state.ledger.remove(&id).await
}
