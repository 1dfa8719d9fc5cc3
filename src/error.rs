//! Service error taxonomy.
//!
//! Four failure classes with distinct semantics: configuration errors abort
//! an operation with no side effects, validation errors are rejected before
//! any write, not-found covers unknown tables/resources, and database errors
//! surface as a generic failure to the caller. Payment-method mapping gaps
//! are deliberately *not* represented here — they are logged and skipped,
//! never returned to a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error type shared by the ledger, relay, and reconciliation paths.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing required reference data (e.g. the VENTAS account). Fatal for
    /// the whole operation, zero partial credit.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad or incomplete request data, rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// Unknown table or resource.
    #[error("{0}")]
    NotFound(String),

    /// Credential check failed.
    #[error("Credenciales inválidas")]
    Unauthorized,

    /// Caller lacks the admin role required by the accounting surface.
    #[error("Acceso denegado: se requiere rol administrador")]
    Forbidden,

    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// A store mutex was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Lock,
}

impl<T> From<std::sync::PoisonError<T>> for ServiceError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ServiceError::Lock
    }
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Config(_) | ServiceError::Db(_) | ServiceError::Lock => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        // Same body shape the legacy frontend expects: { "error": "..." }
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
