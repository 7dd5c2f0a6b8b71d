//! Archived email model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::MailAccountId;

/// Unique identifier for an archived email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchivedEmailId(pub i64);

impl ArchivedEmailId {
    /// Create a new archived email ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ArchivedEmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One archived message.
///
/// `(message_id, account_id)` is the dedup key: no two rows ever share the
/// pair, no matter how many sync runs visit the folder. `is_locked` is a
/// compliance flag; once set, every mutation or deletion attempt fails
/// closed at the repository layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchivedEmail {
    /// Unique identifier (None for unsaved rows).
    pub id: Option<ArchivedEmailId>,
    /// Owning mail account.
    pub account_id: MailAccountId,
    /// RFC822 Message-ID (or a derived surrogate when the header is absent).
    pub message_id: String,
    /// Folder the message was archived from.
    pub folder_name: String,
    /// Subject line.
    pub subject: String,
    /// Sender, formatted as `Name <address>` when a display name exists.
    pub from_addr: String,
    /// To recipients.
    pub to_addrs: Vec<String>,
    /// Cc recipients.
    pub cc_addrs: Vec<String>,
    /// Bcc recipients.
    pub bcc_addrs: Vec<String>,
    /// Date header, when parseable.
    pub sent_at: Option<DateTime<Utc>>,
    /// Server delivery timestamp (falls back to archive time).
    pub received_at: DateTime<Utc>,
    /// Rendered plain-text body.
    pub body_text: Option<String>,
    /// Rendered HTML body.
    pub body_html: Option<String>,
    /// Byte-preserving raw fallback, kept when the original content carries
    /// NUL bytes the text columns cannot represent.
    pub body_raw: Option<Vec<u8>>,
    /// Whether any attachments were archived with the message.
    pub has_attachments: bool,
    /// SHA-256 digest of the normalized content.
    pub content_hash: String,
    /// When the digest was computed.
    pub hash_created_at: DateTime<Utc>,
    /// Compliance lock: forbids mutation and deletion while set.
    pub is_locked: bool,
    /// When the row was written.
    pub archived_at: DateTime<Utc>,
}

/// An attachment owned by exactly one archived email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailAttachment {
    /// Unique identifier (None for unsaved rows).
    pub id: Option<i64>,
    /// Owning archived email (filled in at insert time).
    pub email_id: Option<ArchivedEmailId>,
    /// Attachment filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Attachment bytes.
    pub content: Vec<u8>,
    /// Content-ID for inline references, when present.
    pub content_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn archived_email_id_displays_inner_value() {
        assert_eq!(format!("{}", ArchivedEmailId::new(7)), "7");
    }

    #[test]
    fn default_email_is_unlocked() {
        let email = ArchivedEmail::default();
        assert!(!email.is_locked);
        assert!(email.id.is_none());
    }
}
