//! Error types for the threads API and caches.

use thiserror::Error;

/// Errors that can occur when talking to the threads API or its caches.
#[derive(Debug, Error)]
pub enum ThreadsError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The token provider could not supply a bearer token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed data reached the cache layer (e.g. a thread record with no
    /// comments), or a required dependency was missing at construction.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl ThreadsError {
    /// True if this error came from a non-2xx API response.
    pub fn is_api_error(&self) -> bool {
        matches!(self, ThreadsError::Api { .. })
    }
}
