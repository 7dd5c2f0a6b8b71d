//! Error types for the IMAP transport.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP transport operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Underlying IMAP protocol error.
    #[error("IMAP protocol error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The server response was missing data we asked for.
    #[error("Missing data in server response: {0}")]
    MissingData(&'static str),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
