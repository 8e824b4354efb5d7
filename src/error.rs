//! Error types shared across the store, query engine and delivery pipeline.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;

/// Unified error type for store operations.
///
/// Every RPC method maps one of these onto the wire error envelope;
/// [`StoreError::code`] supplies the machine-readable code.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lookup for a mutation target failed. Read-path misses return
    /// `None` instead of this error.
    #[error("document '{id}' of type '{model}' not found")]
    NotFound { model: String, id: String },

    /// Caller supplied input that fails validation: malformed filter,
    /// bad sink configuration, retention below the floor.
    #[error("{0}")]
    Validation(String),

    /// Request could not be decoded into the expected shape.
    #[error("{0}")]
    BadRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    /// Stable error code carried in RPC error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Validation(_) => "VALIDATION",
            StoreError::BadRequest(_) => "BAD_REQUEST",
            StoreError::Io(_) | StoreError::Serde(_) | StoreError::Http(_) => "INTERNAL",
        }
    }

    /// Shortcut for the common miss case.
    pub fn not_found(model: &str, id: &str) -> Self {
        StoreError::NotFound {
            model: model.to_string(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        StoreError::BadRequest(message.into())
    }
}
