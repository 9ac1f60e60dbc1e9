use crate::models::{CreateClient, UpdateClient};
use crate::outcome::Outcome;
use crate::startup::AppState;
use crate::store::new_id;
use axum::{
    extract::{Path, State},
    routing::{delete, patch, post},
    Json, Router,
};
use mongodb::bson::{doc, to_document, Document};
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
    Json(input): Json<CreateClient>,
) -> Result<Outcome<Document>, AppError> {
    input.validate()?;

    let client = input.into_client(new_id());
    tracing::info!(client_id = %client.id, "Creating client");
    let stored = state
        .collections
        .clients
        .insert(to_document(&client)?)
        .await?;
    Ok(Outcome::Created(stored))
}

#[tracing::instrument(skip_all, fields(client_id = %id))]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateClient>,
) -> Result<Outcome<Document>, AppError> {
    patch.validate()?;

    let clients = &state.collections.clients;
    if !clients
        .update_by_id(&id, doc! { "$set": patch.to_set() })
        .await?
    {
        return Ok(Outcome::NotFound(format!("Client {} not found", id)));
    }
    Ok(match clients.find_by_id(&id).await? {
        Some(document) => Outcome::Ok(document),
        None => Outcome::NotFound(format!("Client {} not found", id)),
    })
}

#[tracing::instrument(skip_all, fields(client_id = %id))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    state.financial.remove_client(&id).await
}
