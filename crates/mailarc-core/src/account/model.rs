//! Mail account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a mail account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailAccountId(pub i64);

impl MailAccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MailAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mail source a given account archives from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderType {
    /// Generic IMAP server.
    #[default]
    Imap,
    /// Microsoft 365 mailbox via the Graph API.
    M365,
    /// Local file imports (EML/MBox); no remote transport.
    Import,
}

impl ProviderType {
    /// Stable string used in the database column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::M365 => "m365",
            Self::Import => "import",
        }
    }

    /// Parse the database column value, defaulting unknown values to IMAP.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "m365" => Self::M365,
            "import" => Self::Import,
            _ => Self::Imap,
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// IMAP transport credentials. Required only for [`ProviderType::Imap`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImapSettings {
    /// Server hostname.
    pub server: String,
    /// Server port (993 for implicit TLS).
    pub port: u16,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
}

/// Microsoft Graph credentials. Required only for [`ProviderType::M365`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Azure AD tenant id.
    pub tenant_id: String,
    /// Mailbox to archive (user principal name).
    pub mailbox: String,
}

/// A mail account the archiver synchronizes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailAccount {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<MailAccountId>,
    /// Display name for the account.
    pub name: String,
    /// Owning application user.
    pub user_id: String,
    /// Which provider this account talks to.
    pub provider: ProviderType,
    /// IMAP credentials, when provider is IMAP.
    pub imap: Option<ImapSettings>,
    /// Graph credentials, when provider is M365.
    pub graph: Option<GraphSettings>,
    /// Folder names excluded from sync and server retention.
    pub excluded_folders: Vec<String>,
    /// Completion time of the last successful full folder scan.
    pub last_sync: Option<DateTime<Utc>>,
    /// Disabled accounts are skipped by scheduled syncs.
    pub is_enabled: bool,
    /// Force every sync to scan from epoch instead of `last_sync`.
    pub always_full_sync: bool,
    /// Server retention: delete remote messages older than this many days.
    pub delete_after_days: Option<u32>,
    /// Local retention: delete archived rows older than this many days.
    ///
    /// Only valid when `delete_after_days` is also set and not larger than
    /// this value, so the archive always outlives the mailbox.
    pub local_retention_days: Option<u32>,
}

impl MailAccount {
    /// Create a new enabled account for a provider.
    #[must_use]
    pub fn new(name: impl Into<String>, user_id: impl Into<String>, provider: ProviderType) -> Self {
        Self {
            name: name.into(),
            user_id: user_id.into(),
            provider,
            is_enabled: true,
            ..Self::default()
        }
    }

    /// Whether a folder is excluded from sync (case-insensitive).
    #[must_use]
    pub fn is_folder_excluded(&self, folder: &str) -> bool {
        self.excluded_folders
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(folder))
    }
}
