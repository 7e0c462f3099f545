//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use vault_sync::ClientError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Version conflict, server is at {server_version}")]
    Conflict { server_version: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotFound(uid) => AppError::NotFound(uid),
            ClientError::Conflict { server_version } => AppError::Conflict { server_version },
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Error response body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_version: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut server_version = None;
        let (status, error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(uid) => (
                StatusCode::NOT_FOUND,
                "document not found".to_string(),
                Some(uid.clone()),
            ),
            AppError::Conflict {
                server_version: version,
            } => {
                server_version = Some(*version);
                (StatusCode::CONFLICT, "version conflict".to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
            server_version,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
