//! Error types for brickmap-xr
//!
//! [`EngineError`] is what the materializer and matching pass report.
//! [`ApiError`] is what HTTP handlers return; it renders as
//! `{"error": {"code", "message"}}`.

use crate::catalog::CatalogError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Engine error taxonomy
///
/// Only `InventoryUnavailable` aborts a materialization; the others degrade a
/// single entity and are recorded in the batch report.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or empty identifier
    #[error("Validation error: {0}")]
    Validation(String),

    /// Retries exhausted, network failure or non-retryable upstream status
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Fetch exceeded its time budget
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// No local data and no live fallback for the requested container
    #[error("Inventory unavailable for container {0}")]
    InventoryUnavailable(String),

    #[error("Common error: {0}")]
    Common(#[from] brickmap_common::Error),
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(msg) => EngineError::Validation(msg),
            CatalogError::Timeout(after) => EngineError::Timeout(after),
            other => EngineError::UpstreamUnavailable(other.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. matching pass already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error("Common error: {0}")]
    Common(#[from] brickmap_common::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
            ApiError::Engine(ref err) => match err {
                EngineError::InventoryUnavailable(_) => {
                    (StatusCode::NOT_FOUND, "INVENTORY_UNAVAILABLE", err.to_string())
                }
                EngineError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
                }
                EngineError::UpstreamUnavailable(_) | EngineError::Timeout(_) => {
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", err.to_string())
                }
                EngineError::Common(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string())
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
