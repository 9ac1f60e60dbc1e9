use crate::models::{CreateQuote, UpdateQuote};
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

#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateQuote>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;
    state.financial.create_quote(input).await
}

#[tracing::instrument(skip_all, fields(quote_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateQuote>,
) -> Result<Outcome<Document>, AppError> {
    patch.validate()?;
    state.financial.update_quote(&id, patch).await
}

#[tracing::instrument(skip_all, fields(quote_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    state.financial.remove_quote(&id).await
}
