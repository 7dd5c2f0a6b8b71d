//! Error types for the core library.

use thiserror::Error;

use crate::account::validation::ValidationError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP transport failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailarc_imap::Error),

    /// Graph transport failed.
    #[error("Graph error: {0}")]
    Graph(#[from] mailarc_graph::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not open a connection or session to a provider.
    ///
    /// Fatal for the job that hit it: the job fails without advancing
    /// `last_sync`.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Mail account not found.
    #[error("Mail account not found: {0}")]
    AccountNotFound(i64),

    /// Archived email not found.
    #[error("Archived email not found: {0}")]
    EmailNotFound(i64),

    /// Job not found in the registry.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Operation is not supported by this provider.
    #[error("Operation not supported by this provider: {0}")]
    Unsupported(&'static str),

    /// Account configuration failed validation.
    #[error("Validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Attempted to mutate or delete a compliance-locked email.
    #[error("Archived email {0} is locked and cannot be modified or deleted")]
    EmailLocked(i64),

    /// Request exceeded the maximum accepted batch size.
    #[error("Too many emails requested: {requested} exceeds the maximum of {max}")]
    TooManyEmails {
        /// Number of emails in the request.
        requested: usize,
        /// Configured hard cap.
        max: usize,
    },

    /// Message could not be parsed as MIME.
    #[error("Mail parse error: {0}")]
    MailParse(String),

    /// Message could not be rebuilt as RFC822.
    #[error("Mail build error: {0}")]
    MailBuild(String),

    /// The operation was cancelled cooperatively.
    #[error("Operation cancelled")]
    Cancelled,
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_all_messages() {
        let err = Error::Validation(vec![
            ValidationError::EmptyName,
            ValidationError::LocalRetentionRequiresServerRetention,
        ]);
        let text = err.to_string();
        assert!(text.contains("Account name is required"));
        assert!(text.contains("requires a server retention"));
    }
}
