//! Shared error type for imp
//!
//! Every fallible operation in the crate returns [`ImpError`]. Each variant
//! maps onto exactly one HTTP status so handlers can turn any error into an
//! envelope without inspecting it further.

use hyper::StatusCode;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T, E = ImpError> = std::result::Result<T, E>;

/// Errors surfaced by the core and the HTTP layer
#[derive(Debug, Error)]
pub enum ImpError {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Missing credentials, or a nonce/token that does not match
    #[error("{0}")]
    Unauthorized(String),

    /// Unknown user or host
    #[error("{0}")]
    NotFound(String),

    /// Unique identity already taken
    #[error("{0}")]
    Conflict(String),

    /// Throttled by the rate limiter or a pending handshake
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<i64>,
    },

    /// Host discovery exhausted every candidate without confirmation
    #[error("Could not locate the IMP host: {0}")]
    HostUnreachable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImpError {
    /// Rate-limit error without a computable retry hint
    pub fn too_many(message: impl Into<String>) -> Self {
        ImpError::RateLimited {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            ImpError::Validation(_) => StatusCode::BAD_REQUEST,
            ImpError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ImpError::NotFound(_) => StatusCode::NOT_FOUND,
            ImpError::Conflict(_) => StatusCode::CONFLICT,
            ImpError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ImpError::HostUnreachable(_)
            | ImpError::Database(_)
            | ImpError::Http(_)
            | ImpError::Auth(_)
            | ImpError::Config(_)
            | ImpError::Io(_)
            | ImpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is a server-side failure that must be logged
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Message safe to show to the caller.
    ///
    /// Server errors are reported generically; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        if self.is_server_error() {
            match self {
                ImpError::HostUnreachable(_) => "Could not locate the IMP host.".to_string(),
                _ => "Internal Server Error".to_string(),
            }
        } else {
            self.to_string()
        }
    }
}
