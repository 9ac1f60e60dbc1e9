//! Read routes shared by every entity.

use crate::outcome::Outcome;
use crate::services::query::{Page, Summary};
use crate::services::{QueryEngine, QueryParams};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use mongodb::bson::Document;
use service_core::error::AppError;

/// `read`, `list`, `listAll`, `search`, `filter` and `summary` over one collection.
pub fn routes<S>(engine: QueryEngine) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/read/:id", get(read))
        .route("/list", get(list))
        .route("/listAll", get(list_all))
        .route("/search", get(search))
        .route("/filter", get(filter))
        .route("/summary", get(summary))
        .with_state(engine)
}

#[tracing::instrument(skip_all, fields(collection = engine.collection().name(), id = %id))]
pub async fn read(
    State(engine): State<QueryEngine>,
    Path(id): Path<String>,
) -> Result<Outcome<Document>, AppError> {
    engine.read(&id).await
}

#[tracing::instrument(skip(engine), fields(collection = engine.collection().name()))]
pub async fn list(
    State(engine): State<QueryEngine>,
    Query(params): Query<QueryParams>,
) -> Result<Outcome<Page>, AppError> {
    engine.list(&params).await
}

#[tracing::instrument(skip(engine), fields(collection = engine.collection().name()))]
pub async fn list_all(
    State(engine): State<QueryEngine>,
    Query(params): Query<QueryParams>,
) -> Result<Outcome<Vec<Document>>, AppError> {
    engine.list_all(&params).await
}

#[tracing::instrument(skip(engine), fields(collection = engine.collection().name()))]
pub async fn search(
    State(engine): State<QueryEngine>,
    Query(params): Query<QueryParams>,
) -> Result<Outcome<Vec<Document>>, AppError> {
    engine.search(&params).await
}

#[tracing::instrument(skip(engine), fields(collection = engine.collection().name()))]
pub async fn filter(
    State(engine): State<QueryEngine>,
    Query(params): Query<QueryParams>,
) -> Result<Outcome<Vec<Document>>, AppError> {
    engine.filter(&params).await
}

#[tracing::instrument(skip(engine), fields(collection = engine.collection().name()))]
pub async fn summary(
    State(engine): State<QueryEngine>,
    Query(params): Query<QueryParams>,
) -> Result<Outcome<Summary>, AppError> {
    engine.summary(&params).await
}
