//! JSON export records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::ArchivedEmail;

/// Envelope view of an archived email for JSON exports.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    /// Archive row id.
    pub id: Option<i64>,
    /// Dedup message id.
    pub message_id: String,
    /// Source folder.
    pub folder: String,
    /// Subject line.
    pub subject: String,
    /// Sender.
    pub from: String,
    /// To recipients.
    pub to: Vec<String>,
    /// Cc recipients.
    pub cc: Vec<String>,
    /// Date header.
    pub sent_at: Option<DateTime<Utc>>,
    /// Delivery time.
    pub received_at: DateTime<Utc>,
    /// Whether attachments exist (contents are not exported).
    pub has_attachments: bool,
    /// Plain-text body.
    pub body_text: Option<String>,
}

impl From<&ArchivedEmail> for ExportRecord {
    fn from(email: &ArchivedEmail) -> Self {
        Self {
            id: email.id.map(|id| id.0),
            message_id: email.message_id.clone(),
            folder: email.folder_name.clone(),
            subject: email.subject.clone(),
            from: email.from_addr.clone(),
            to: email.to_addrs.clone(),
            cc: email.cc_addrs.clone(),
            sent_at: email.sent_at,
            received_at: email.received_at,
            has_attachments: email.has_attachments,
            body_text: email.body_text.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::MailAccountId;

    #[test]
    fn record_serializes_envelope_fields() {
        let email = ArchivedEmail {
            account_id: MailAccountId::new(1),
            message_id: "m@x".into(),
            folder_name: "Sent".into(),
            subject: "hello".into(),
            body_text: Some("hi".into()),
            received_at: Utc::now(),
            ..ArchivedEmail::default()
        };

        let json = serde_json::to_value(ExportRecord::from(&email)).unwrap();
        assert_eq!(json["message_id"], "m@x");
        assert_eq!(json["folder"], "Sent");
        assert_eq!(json["body_text"], "hi");
        assert!(json.get("content_hash").is_none());
    }
}
