//! Result and error types for the security core
//!
//! Every failure a controller can observe is one of these variants; the
//! `status_code` mapping is the HTTP contract for the surrounding REST layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a CSRF check failed, distinguished so clients can retry correctly:
/// a missing token means "fetch one first", an invalid token means "re-fetch".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsrfReason {
    MissingToken,
    InvalidToken,
}

impl CsrfReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrfReason::MissingToken => "missing_token",
            CsrfReason::InvalidToken => "invalid_token",
        }
    }
}

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSRF verification failed: {}", .0.as_str())]
    Csrf(CsrfReason),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an encryption error
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// HTTP status the REST layer should respond with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Auth(_) => 401,
            Error::Validation(_) => 400,
            Error::Encryption(_) => 500,
            Error::Csrf(_) => 403,
            Error::RateLimited { .. } => 429,
            Error::NotFound(_) => 404,
            Error::Database(_) | Error::Io(_) | Error::Json(_) | Error::Other(_) => 500,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
