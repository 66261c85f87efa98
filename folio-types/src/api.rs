//! JSON bodies returned outside the event stream.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `GET /health` response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Current server time, RFC 3339 / ISO-8601 in UTC.
    pub timestamp: String,
    /// Server crate version.
    pub version: String,
}

/// 400 body: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrorBody {
    pub error: String,
}

/// 500 body: `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
}

impl FailureBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// 404 body for unmatched routes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotFoundBody {
    pub success: bool,
    pub error: String,
    pub path: String,
    pub method: String,
}

impl NotFoundBody {
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            success: false,
            error: "Not Found".to_owned(),
            path: path.into(),
            method: method.into(),
        }
    }
}
