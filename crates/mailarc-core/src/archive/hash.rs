//! Content hashing for duplicate detection and integrity.

use sha2::{Digest, Sha256};

use super::parse::ParsedEmail;

/// Compute the SHA-256 digest of a message's normalized content.
///
/// The canonical form is the trimmed Message-ID, sender, recipients,
/// subject, RFC3339 sent date, and body text (HTML when no text part
/// exists), joined by newlines. Header ordering and transport framing do
/// not affect the digest, so byte-identical reimports hash identically
/// regardless of which path delivered them.
#[must_use]
pub fn content_hash(parsed: &ParsedEmail) -> String {
    let mut hasher = Sha256::new();

    let mut feed = |value: &str| {
        hasher.update(value.trim().as_bytes());
        hasher.update(b"\n");
    };

    feed(parsed.message_id.as_deref().unwrap_or(""));
    feed(&parsed.from_addr);
    feed(&parsed.to_addrs.join(","));
    feed(&parsed.subject);
    feed(
        &parsed
            .sent_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default(),
    );
    feed(
        parsed
            .body_text
            .as_deref()
            .or(parsed.body_html.as_deref())
            .unwrap_or(""),
    );

    format!("{:x}", hasher.finalize())
}
