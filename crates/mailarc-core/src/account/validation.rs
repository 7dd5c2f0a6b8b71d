//! Account validation.
//!
//! Runs at configuration-save time, not at sync time: a violating account
//! is rejected before it is persisted.

use super::model::{MailAccount, ProviderType};

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Owning user is empty.
    EmptyUser,
    /// IMAP credentials missing for an IMAP account.
    MissingImapSettings,
    /// IMAP server hostname is empty.
    EmptyImapServer,
    /// IMAP port is invalid.
    InvalidImapPort,
    /// IMAP username is empty.
    EmptyImapUsername,
    /// IMAP password is empty.
    EmptyImapPassword,
    /// Graph credentials missing for an M365 account.
    MissingGraphSettings,
    /// Graph client id is empty.
    EmptyClientId,
    /// Graph client secret is empty.
    EmptyClientSecret,
    /// Graph tenant id is empty.
    EmptyTenantId,
    /// Graph mailbox is empty.
    EmptyMailbox,
    /// Local retention is set without server retention.
    LocalRetentionRequiresServerRetention,
    /// Local retention is shorter than server retention.
    LocalRetentionShorterThanServerRetention,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::EmptyUser => "Owning user is required",
            Self::MissingImapSettings => "IMAP credentials are required for IMAP accounts",
            Self::EmptyImapServer => "IMAP server is required",
            Self::InvalidImapPort => "IMAP port must be 1-65535",
            Self::EmptyImapUsername => "IMAP username is required",
            Self::EmptyImapPassword => "IMAP password is required",
            Self::MissingGraphSettings => "Graph credentials are required for M365 accounts",
            Self::EmptyClientId => "Client id is required",
            Self::EmptyClientSecret => "Client secret is required",
            Self::EmptyTenantId => "Tenant id is required",
            Self::EmptyMailbox => "Mailbox address is required",
            Self::LocalRetentionRequiresServerRetention => {
                "Local retention requires a server retention period to be set"
            }
            Self::LocalRetentionShorterThanServerRetention => {
                "Local retention must be at least as long as server retention"
            }
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyUser => "user_id",
            Self::MissingImapSettings => "imap",
            Self::EmptyImapServer => "imap.server",
            Self::InvalidImapPort => "imap.port",
            Self::EmptyImapUsername => "imap.username",
            Self::EmptyImapPassword => "imap.password",
            Self::MissingGraphSettings => "graph",
            Self::EmptyClientId => "graph.client_id",
            Self::EmptyClientSecret => "graph.client_secret",
            Self::EmptyTenantId => "graph.tenant_id",
            Self::EmptyMailbox => "graph.mailbox",
            Self::LocalRetentionRequiresServerRetention
            | Self::LocalRetentionShorterThanServerRetention => "local_retention_days",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Validate an account configuration.
///
/// Transport fields are enforced per provider type, not globally: an Import
/// account needs no credentials at all.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &MailAccount) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    if account.user_id.trim().is_empty() {
        errors.push(ValidationError::EmptyUser);
    }

    match account.provider {
        ProviderType::Imap => match &account.imap {
            None => errors.push(ValidationError::MissingImapSettings),
            Some(imap) => {
                if imap.server.trim().is_empty() {
                    errors.push(ValidationError::EmptyImapServer);
                }
                if imap.port == 0 {
                    errors.push(ValidationError::InvalidImapPort);
                }
                if imap.username.trim().is_empty() {
                    errors.push(ValidationError::EmptyImapUsername);
                }
                if imap.password.is_empty() {
                    errors.push(ValidationError::EmptyImapPassword);
                }
            }
        },
        ProviderType::M365 => match &account.graph {
            None => errors.push(ValidationError::MissingGraphSettings),
            Some(graph) => {
                if graph.client_id.trim().is_empty() {
                    errors.push(ValidationError::EmptyClientId);
                }
                if graph.client_secret.is_empty() {
                    errors.push(ValidationError::EmptyClientSecret);
                }
                if graph.tenant_id.trim().is_empty() {
                    errors.push(ValidationError::EmptyTenantId);
                }
                if graph.mailbox.trim().is_empty() {
                    errors.push(ValidationError::EmptyMailbox);
                }
            }
        },
        ProviderType::Import => {}
    }

    match (account.delete_after_days, account.local_retention_days) {
        (None, Some(_)) => errors.push(ValidationError::LocalRetentionRequiresServerRetention),
        (Some(server), Some(local)) if local < server => {
            errors.push(ValidationError::LocalRetentionShorterThanServerRetention);
        }
        _ => {}
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
