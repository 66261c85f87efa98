//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Upstream failures are logged with full detail; callers only get a generic
//! message.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_types::{FailureBody, NotFoundBody, ValidationErrorBody};
use folio_upstream::UpstreamError;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// All errors that can occur before a response starts streaming.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The LLM provider could not be reached or refused the request.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// No route matched.
    #[error("not found: {method} {path}")]
    NotFound { path: String, method: String },

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the given number of bytes.
    #[error("request body larger than {0} bytes")]
    PayloadTooLarge(usize),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ValidationErrorBody { error })).into_response()
            }
            ServerError::PayloadTooLarge(limit) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ValidationErrorBody {
                    error: format!("Request body exceeds {limit} bytes"),
                }),
            )
                .into_response(),
            ServerError::NotFound { path, method } => {
                (StatusCode::NOT_FOUND, Json(NotFoundBody::new(path, method))).into_response()
            }
            ServerError::Upstream(e) => {
                error!(error = %e, "upstream request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(FailureBody::new("The assistant is unavailable right now")),
                )
                    .into_response()
            }
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<ValidationErrors> for ServerError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| errors.to_string());
        ServerError::BadRequest(message)
    }
}
