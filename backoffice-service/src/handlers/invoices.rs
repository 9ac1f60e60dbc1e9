use crate::models::{CreateInvoice, UpdateInvoice};
use crate::outcome::Outcome;
use crate::services::ledger::Breakdown;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, patch, post},
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
        .route("/breakdown", get(breakdown))
}

#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateInvoice>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;
    state.financial.create_invoice(input).await
}

#[tracing::instrument(skip_all, fields(invoice_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateInvoice>,
) -> Result<Outcome<Document>, AppError> {
    patch.validate()?;
    state.financial.update_invoice(&id, patch).await
}

/// Soft-delete an invoice and the payments recorded against it.
#[tracing::instrument(skip_all, fields(invoice_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    state.ledger.remove_invoice(&id).await
}

#[tracing::instrument(skip_all)]
pub async fn breakdown(State(state): State<AppState>) -> Result<Outcome<Breakdown>, AppError> {
    state.ledger.breakdown().await
}
