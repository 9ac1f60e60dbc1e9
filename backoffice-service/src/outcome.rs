//! Result envelope for business operations.
//!
//! "Nothing matched", "would break an invariant" and "would overpay" are ordinary
//! results here rather than errors. Only malformed input and infrastructure failures
//! travel as [`AppError`](service_core::error::AppError).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mongodb::bson::{Bson, Document};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    /// Same as `Ok` but answered with `201 Created`.
    Created(T),
    /// The operation succeeded and matched zero documents.
    Empty,
    NotFound(String),
    Conflict(String),
    OverLimit(String),
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(value) => Outcome::Ok(f(value)),
            Outcome::Created(value) => Outcome::Created(f(value)),
            Outcome::Empty => Outcome::Empty,
            Outcome::NotFound(message) => Outcome::NotFound(message),
            Outcome::Conflict(message) => Outcome::Conflict(message),
            Outcome::OverLimit(message) => Outcome::OverLimit(message),
        }
    }

    /// The payload of `Ok`/`Created`, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Ok(value) | Outcome::Created(value) => Some(value),
            _ => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Outcome::Ok(_) | Outcome::Created(_) => "OK",
            Outcome::Empty => "EMPTY",
            Outcome::NotFound(_) => "NOT_FOUND",
            Outcome::Conflict(_) => "CONFLICT",
            Outcome::OverLimit(_) => "OVER_LIMIT",
        }
    }
}

/// Conversion of a result payload into response JSON.
pub trait Payload {
    fn into_json(self) -> Value;
}

impl Payload for Value {
    fn into_json(self) -> Value {
        self
    }
}

impl Payload for Document {
    fn into_json(self) -> Value {
        bson_to_json(Bson::Document(self))
    }
}

impl Payload for Vec<Document> {
    fn into_json(self) -> Value {
        Value::Array(self.into_iter().map(Payload::into_json).collect())
    }
}

/// Render BSON the way API clients expect: dates as RFC 3339 strings, numbers as plain
/// JSON numbers, everything else in relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect::<Map<String, Value>>(),
        ),
        Bson::Array(values) => Value::Array(values.into_iter().map(bson_to_json).collect()),
        Bson::DateTime(at) => at
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Bson::Int32(n) => Value::from(n),
        Bson::Int64(n) => Value::from(n),
        Bson::Double(n) => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        other => other.into_relaxed_extjson(),
    }
}

impl<T: Payload> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        let status = self.status_label();
        match self {
            Outcome::Ok(data) => (
                StatusCode::OK,
                Json(json!({ "status": status, "data": data.into_json() })),
            )
                .into_response(),
            Outcome::Created(data) => (
                StatusCode::CREATED,
                Json(json!({ "status": status, "data": data.into_json() })),
            )
                .into_response(),
            Outcome::Empty => (
                StatusCode::NON_AUTHORITATIVE_INFORMATION,
                Json(json!({ "status": status, "data": [] })),
            )
                .into_response(),
            Outcome::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "status": status, "message": message })),
            )
                .into_response(),
            Outcome::Conflict(message) => (
                StatusCode::CONFLICT,
                Json(json!({ "status": status, "message": message })),
            )
                .into_response(),
            Outcome::OverLimit(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": status, "message": message })),
            )
                .into_response(),
        }
    }
}
