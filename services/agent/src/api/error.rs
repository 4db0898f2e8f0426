//! Common API error type and response shape.
//!
//! Every error leaves the server as
//! `{"status":"error","error":{"error_code":..,"description":..}}`.
//! Store internals are logged, never echoed to the client.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Machine-readable error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code (machine-readable).
    pub error_code: String,

    /// Human-readable error description.
    pub description: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    error: ErrorDetail,
}

/// API error type that can be converted to a response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: ErrorDetail,
}

impl ApiError {
    fn new(status: StatusCode, error_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status,
            detail: ErrorDetail {
                error_code: error_code.into(),
                description: description.into(),
            },
        }
    }

    pub fn bad_input(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, description)
    }

    pub fn unauthenticated(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", description)
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "unauthorized", description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", description)
    }

    pub fn internal(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, description)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            status: "error",
            error: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Store operation failed while serving a request");
        ApiError::internal("store_error", "The operation could not be completed")
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        tracing::error!(error = %e, "Configuration access failed while serving a request");
        ApiError::internal("config_error", "The agent configuration is incomplete")
    }
}
