//! Access log model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    /// User signed in.
    Login,
    /// User signed out.
    Logout,
    /// Archive search was executed.
    Search,
    /// An archived email was opened.
    Open,
    /// An export artifact was downloaded.
    Download,
    /// Emails were restored to a mailbox.
    Restore,
    /// An account was created, changed or removed.
    Account,
    /// Emails were deleted (manual or retention).
    Deletion,
}

impl AccessType {
    /// Stable string used in the database column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Search => "search",
            Self::Open => "open",
            Self::Download => "download",
            Self::Restore => "restore",
            Self::Account => "account",
            Self::Deletion => "deletion",
        }
    }

    /// Parse the database column value.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "search" => Self::Search,
            "open" => Self::Open,
            "download" => Self::Download,
            "restore" => Self::Restore,
            "deletion" => Self::Deletion,
            _ => Self::Account,
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// Unique identifier.
    pub id: i64,
    /// Application user who performed the action.
    pub username: String,
    /// What kind of action it was.
    pub access_type: AccessType,
    /// Free-form context, e.g. a search term or an email subject.
    pub context: String,
    /// When the action happened.
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_type_round_trips() {
        for access in [
            AccessType::Login,
            AccessType::Logout,
            AccessType::Search,
            AccessType::Open,
            AccessType::Download,
            AccessType::Restore,
            AccessType::Account,
            AccessType::Deletion,
        ] {
            assert_eq!(AccessType::from_str_lossy(access.as_str()), access);
        }
    }
}
