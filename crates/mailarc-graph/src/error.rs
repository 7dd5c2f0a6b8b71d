//! Error types for the Graph client.

use thiserror::Error;

/// Errors that can occur during Graph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token endpoint rejected the credential grant.
    #[error("Token acquisition failed: {0}")]
    Token(String),

    /// Graph API returned a non-success status.
    #[error("Graph API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body or reason phrase.
        message: String,
    },

    /// The server kept rate limiting past the retry budget.
    #[error("Rate limited after {0} retries")]
    RateLimited(usize),

    /// Response body did not match the expected shape.
    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
