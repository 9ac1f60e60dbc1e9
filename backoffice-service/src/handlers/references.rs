//! Write routes for taxes and payment modes.

use crate::models::{CreatePaymentMode, CreateTax, ReferencePatch};
use crate::outcome::Outcome;
use crate::services::DefaultManager;
use crate::store::new_id;
use axum::{
    extract::{Path, State},
    routing::{delete, patch, post},
    Json, Router,
};
use mongodb::bson::{to_document, Document};
use service_core::error::AppError;
use validator::Validate;

pub fn tax_routes<S>(manager: DefaultManager) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/create", post(create_tax))
        .route("/update/:id", patch(update))
        .route("/delete/:id", delete(remove))
        .with_state(manager)
}

pub fn payment_mode_routes<S>(manager: DefaultManager) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/create", post(create_payment_mode))
        .route("/update/:id", patch(update))
        .route("/delete/:id", delete(remove))
        .with_state(manager)
}

#[tracing::instrument(skip_all)]
pub async fn create_tax(
    State(manager): State<DefaultManager>,
    Json(input): Json<CreateTax>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;
    let tax = input
        .into_tax(new_id())
        .ok_or_else(|| AppError::bad_request("taxValue must be a number"))?;
    manager.create(to_document(&tax)?).await
}

#[tracing::instrument(skip_all)]
pub async fn create_payment_mode(
    State(manager): State<DefaultManager>,
    Json(input): Json<CreatePaymentMode>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;
    manager
        .create(to_document(&input.into_payment_mode(new_id()))?)
        .await
}

#[tracing::instrument(skip_all, fields(collection = manager.collection().name(), id = %id))]
pub async fn update(
    State(manager): State<DefaultManager>,
    Path(id): Path<String>,
    Json(patch): Json<ReferencePatch>,
) -> Result<Outcome<Document>, AppError> {
    patch.validate()?;
    let set = patch
        .to_set()
        .map_err(|field| AppError::bad_request(format!("{} must be a number", field)))?;
    manager.update(&id, set).await
}

#[tracing::instrument(skip_all, fields(collection = manager.collection().name(), id = %id))]
pub async fn remove(
    State(manager): State<DefaultManager>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    manager.remove(&id).await
}
