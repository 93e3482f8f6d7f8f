//! Error types for studyshare-core

use thiserror::Error;

/// Result type alias using studyshare-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in studyshare-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No authenticated principal is available
    #[error("Not signed in: no active session")]
    NoSession,

    /// Invalid input rejected before any request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Table store error, message as reported by the backend
    #[error("Store error: {0}")]
    Store(String),

    /// Blob storage error, message as reported by the backend
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
