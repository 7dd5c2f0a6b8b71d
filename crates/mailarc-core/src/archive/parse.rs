//! MIME parsing into the archive model.
//!
//! Every ingestion path (IMAP sync, Graph sync, EML/MBox import) runs raw
//! message bytes through [`parse_email`] and stores the result with
//! [`ParsedEmail::into_archived`].

use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser, MimeHeaders};

use super::model::{ArchivedEmail, EmailAttachment};
use crate::account::MailAccountId;
use crate::archive::hash;
use crate::{Error, Result};

/// A message parsed out of raw RFC822 bytes, ready to archive.
#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    /// RFC822 Message-ID without angle brackets, when present.
    pub message_id: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Formatted sender.
    pub from_addr: String,
    /// To recipients.
    pub to_addrs: Vec<String>,
    /// Cc recipients.
    pub cc_addrs: Vec<String>,
    /// Bcc recipients.
    pub bcc_addrs: Vec<String>,
    /// Date header.
    pub sent_at: Option<DateTime<Utc>>,
    /// Plain-text body.
    pub body_text: Option<String>,
    /// HTML body.
    pub body_html: Option<String>,
    /// Attachments, inline parts included.
    pub attachments: Vec<EmailAttachment>,
    /// Whether the raw bytes contain NUL bytes.
    pub has_nul_bytes: bool,
}

/// Parse raw RFC822 bytes.
///
/// # Errors
///
/// Returns [`Error::MailParse`] when the bytes are not parseable as MIME.
pub fn parse_email(raw: &[u8]) -> Result<ParsedEmail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::MailParse("unparseable MIME content".to_string()))?;

    // An "empty" parse with neither headers nor body counts as malformed.
    if message.headers().is_empty() {
        return Err(Error::MailParse("message has no headers".to_string()));
    }

    let attachments = message
        .attachments()
        .map(|part| EmailAttachment {
            id: None,
            email_id: None,
            filename: part
                .attachment_name()
                .unwrap_or("attachment")
                .to_string(),
            content_type: part.content_type().map_or_else(
                || "application/octet-stream".to_string(),
                |ct| {
                    format!(
                        "{}/{}",
                        ct.ctype(),
                        ct.subtype().unwrap_or("octet-stream")
                    )
                },
            ),
            content: part.contents().to_vec(),
            content_id: part.content_id().map(ToString::to_string),
        })
        .collect();

    Ok(ParsedEmail {
        message_id: message.message_id().map(ToString::to_string),
        subject: message.subject().unwrap_or_default().to_string(),
        from_addr: message
            .from()
            .and_then(format_first_address)
            .unwrap_or_default(),
        to_addrs: message.to().map(format_addresses).unwrap_or_default(),
        cc_addrs: message.cc().map(format_addresses).unwrap_or_default(),
        bcc_addrs: message.bcc().map(format_addresses).unwrap_or_default(),
        sent_at: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        body_text: message.body_text(0).map(|s| s.to_string()),
        body_html: message.body_html(0).map(|s| s.to_string()),
        attachments,
        has_nul_bytes: raw.contains(&0),
    })
}

impl ParsedEmail {
    /// Message identity used for the dedup key.
    ///
    /// Messages without a Message-ID header get a surrogate derived from the
    /// content hash so they still dedup across repeated scans.
    #[must_use]
    pub fn dedup_message_id(&self) -> String {
        self.message_id
            .clone()
            .unwrap_or_else(|| format!("mailarc-{}", hash::content_hash(self)))
    }

    /// Build the archive row (and its attachments) for this message.
    ///
    /// `raw` is retained verbatim only when the content carries NUL bytes,
    /// which the text columns cannot hold losslessly.
    #[must_use]
    pub fn into_archived(
        self,
        account_id: MailAccountId,
        folder_name: &str,
        received_at: Option<DateTime<Utc>>,
        raw: &[u8],
    ) -> (ArchivedEmail, Vec<EmailAttachment>) {
        let now = Utc::now();
        let content_hash = hash::content_hash(&self);
        let message_id = self.dedup_message_id();
        let has_attachments = !self.attachments.is_empty();
        let body_raw = self.has_nul_bytes.then(|| raw.to_vec());

        let email = ArchivedEmail {
            id: None,
            account_id,
            message_id,
            folder_name: folder_name.to_string(),
            subject: self.subject,
            from_addr: self.from_addr,
            to_addrs: self.to_addrs,
            cc_addrs: self.cc_addrs,
            bcc_addrs: self.bcc_addrs,
            sent_at: self.sent_at,
            received_at: received_at.unwrap_or(now),
            body_text: self.body_text.map(strip_nul),
            body_html: self.body_html.map(strip_nul),
            body_raw,
            has_attachments,
            content_hash,
            hash_created_at: now,
            is_locked: false,
            archived_at: now,
        };

        (email, self.attachments)
    }
}

fn strip_nul(s: String) -> String {
    if s.contains('\0') {
        s.replace('\0', "")
    } else {
        s
    }
}

fn format_addresses(address: &Address<'_>) -> Vec<String> {
    address.iter().filter_map(format_addr).collect()
}

fn format_first_address(address: &Address<'_>) -> Option<String> {
    address.iter().next().and_then(format_addr)
}

fn format_addr(addr: &mail_parser::Addr<'_>) -> Option<String> {
    let email = addr.address.as_deref()?;
    Some(match addr.name.as_deref() {
        Some(name) if !name.is_empty() => format!("{name} <{email}>"),
        _ => email.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"Message-ID: <msg-1@example.com>\r\n\
From: Alice Example <alice@example.com>\r\n\
To: bob@example.com, Carol <carol@example.com>\r\n\
Subject: Quarterly report\r\n\
Date: Mon, 1 Jan 2024 10:00:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
Please find the numbers attached.\r\n";

    #[test]
    fn parses_envelope_fields() {
        let parsed = parse_email(SAMPLE).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("msg-1@example.com"));
        assert_eq!(parsed.subject, "Quarterly report");
        assert_eq!(parsed.from_addr, "Alice Example <alice@example.com>");
        assert_eq!(
            parsed.to_addrs,
            vec!["bob@example.com".to_string(), "Carol <carol@example.com>".to_string()]
        );
        assert!(parsed.body_text.unwrap().contains("numbers attached"));
        assert!(!parsed.has_nul_bytes);
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(parse_email(b"\x00\x01\x02").is_err());
    }

    #[test]
    fn missing_message_id_gets_hash_surrogate() {
        let raw = b"From: a@example.com\r\nSubject: no id\r\n\r\nbody\r\n";
        let parsed = parse_email(raw).unwrap();
        assert!(parsed.message_id.is_none());
        let surrogate = parsed.dedup_message_id();
        assert!(surrogate.starts_with("mailarc-"));
        // Deterministic across parses of identical bytes.
        assert_eq!(parse_email(raw).unwrap().dedup_message_id(), surrogate);
    }

    #[test]
    fn nul_bytes_trigger_raw_fallback() {
        let raw = b"From: a@example.com\r\nSubject: binary\r\n\r\nbody\x00with nul\r\n".to_vec();
        let parsed = parse_email(&raw).unwrap();
        assert!(parsed.has_nul_bytes);

        let (email, _) =
            parsed.into_archived(MailAccountId::new(1), "INBOX", None, &raw);
        assert_eq!(email.body_raw.as_deref(), Some(raw.as_slice()));
        if let Some(text) = email.body_text {
            assert!(!text.contains('\0'));
        }
    }

    #[test]
    fn into_archived_fills_dedup_and_hash_fields() {
        let parsed = parse_email(SAMPLE).unwrap();
        let (email, attachments) =
            parsed.into_archived(MailAccountId::new(3), "INBOX", None, SAMPLE);
        assert_eq!(email.account_id, MailAccountId::new(3));
        assert_eq!(email.message_id, "msg-1@example.com");
        assert_eq!(email.folder_name, "INBOX");
        assert_eq!(email.content_hash.len(), 64);
        assert!(!email.has_attachments);
        assert!(attachments.is_empty());
        assert!(email.body_raw.is_none());
    }
}
