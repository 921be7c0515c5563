//! Defines the custom `ApiError` type for the ingress HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// A custom error type for the API that can be converted into an HTTP
/// response.
pub enum ApiError {
    /// Represents a validation error for an unprocessable entity.
    UnprocessableEntity(String),

    /// Represents a generic internal server error.
    InternalServerError(String),
}

/// Implements the conversion from `ApiError` into an `axum` response.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::UnprocessableEntity(message) =>
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": message })),
            ApiError::InternalServerError(err) => {
                tracing::error!("Internal server error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
