//! Error taxonomy for the PowerTick API.
//!
//! Library layers (`db`, `storage`) return their own `thiserror` enums. Route
//! handlers convert everything into [`ApiError`], which owns the mapping to an
//! HTTP status and a plain-text body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failures raised while resolving credentials or talking to PostgreSQL.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown environment: {0}. Cannot establish database connection.")]
    UnknownEnvironment(String),

    #[error("{0} must be set when ENVIRONMENT={1}")]
    MissingSetting(&'static str, &'static str),

    #[error("Failed to acquire managed identity token: {0}")]
    Token(String),

    #[error("{0}")]
    Connect(#[source] sqlx::Error),

    #[error("{0}")]
    Query(#[source] sqlx::Error),

    #[error("Cannot render column '{column}' of type {type_name}: {source}")]
    Decode {
        column: String,
        type_name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Cannot render column '{column}': type {type_name} has no text form")]
    UnsupportedType { column: String, type_name: String },
}

/// Failures raised while configuring the artifact store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage connection string: {0}")]
    ConnectionString(String),

    #[error(transparent)]
    Store(#[from] object_store::Error),
}

/// Request-level outcome of a failed handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request parameters (400).
    #[error("{0}")]
    Validation(String),

    /// Unknown identifier or empty result set (404).
    #[error("{0}")]
    NotFound(String),

    /// Route called with a method it does not serve (405).
    #[error("Method {0} not allowed.")]
    MethodNotAllowed(String),

    /// Database, token, storage or serialization failure (500).
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    /// Build a 400 listing every missing field at once.
    pub fn missing_fields(fields: &[&str]) -> Self {
        // ---
        ApiError::Validation(format!(
            "Missing required parameters: {}.",
            fields.join(", ")
        ))
    }

    pub fn status(&self) -> StatusCode {
        // ---
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Database failures only reach the CSV export routes, so they carry that
/// route family's message prefix.
impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::Upstream(format!("Failed to generate CSV: {}", e))
    }
}

impl From<csv::Error> for ApiError {
    fn from(e: csv::Error) -> Self {
        ApiError::Upstream(format!("Failed to generate CSV: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Request rejected with {}: {}", status, self);
        }
        (status, self.to_string()).into_response()
    }
}
