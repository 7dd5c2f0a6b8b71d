//! RFC822 reconstruction of archived emails.

use mail_builder::MessageBuilder;
use mail_builder::headers::raw::Raw;

use crate::archive::{ArchivedEmail, EmailAttachment};
use crate::{Error, Result};

/// Encode an archived email back into RFC822 bytes.
///
/// When the original bytes were retained (`body_raw`) they are returned
/// verbatim; otherwise the message is rebuilt from the structured fields
/// and attachments. A rebuild is not byte-identical to the original but
/// preserves envelope, bodies and attachments.
///
/// # Errors
///
/// Returns [`Error::MailBuild`] when serialization fails.
pub fn encode(email: &ArchivedEmail, attachments: &[EmailAttachment]) -> Result<Vec<u8>> {
    if let Some(raw) = &email.body_raw {
        return Ok(raw.clone());
    }

    let mut builder = MessageBuilder::new()
        .header("Message-ID", Raw::new(format!("<{}>", email.message_id)))
        .subject(email.subject.as_str());

    if !email.from_addr.is_empty() {
        builder = builder.header("From", Raw::new(email.from_addr.as_str()));
    }
    if !email.to_addrs.is_empty() {
        builder = builder.header("To", Raw::new(email.to_addrs.join(", ")));
    }
    if !email.cc_addrs.is_empty() {
        builder = builder.header("Cc", Raw::new(email.cc_addrs.join(", ")));
    }
    if !email.bcc_addrs.is_empty() {
        builder = builder.header("Bcc", Raw::new(email.bcc_addrs.join(", ")));
    }
    if let Some(sent_at) = email.sent_at {
        builder = builder.header("Date", Raw::new(sent_at.to_rfc2822()));
    }

    if let Some(text) = &email.body_text {
        builder = builder.text_body(text.as_str());
    }
    if let Some(html) = &email.body_html {
        builder = builder.html_body(html.as_str());
    }

    for attachment in attachments {
        builder = match &attachment.content_id {
            Some(cid) => builder.inline(
                attachment.content_type.as_str(),
                cid.as_str(),
                attachment.content.clone(),
            ),
            None => builder.attachment(
                attachment.content_type.as_str(),
                attachment.filename.as_str(),
                attachment.content.clone(),
            ),
        };
    }

    builder
        .write_to_vec()
        .map_err(|e| Error::MailBuild(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::MailAccountId;
    use crate::archive::parse_email;

    const SAMPLE: &[u8] = b"Message-ID: <r1@example.com>\r\n\
From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Quarterly report\r\n\
Date: Tue, 2 Jan 2024 03:04:05 +0000\r\n\
\r\n\
Numbers attached.\r\n";

    fn archived() -> (ArchivedEmail, Vec<EmailAttachment>) {
        parse_email(SAMPLE).unwrap().into_archived(
            MailAccountId::new(1),
            "INBOX",
            None,
            SAMPLE,
        )
    }

    #[test]
    fn raw_copy_wins_when_present() {
        let (mut email, attachments) = archived();
        email.body_raw = Some(SAMPLE.to_vec());
        assert_eq!(encode(&email, &attachments).unwrap(), SAMPLE);
    }

    #[test]
    fn rebuild_round_trips_through_the_parser() {
        let (email, attachments) = archived();
        assert!(email.body_raw.is_none());

        let bytes = encode(&email, &attachments).unwrap();
        let reparsed = parse_email(&bytes).unwrap();
        assert_eq!(reparsed.message_id.as_deref(), Some("r1@example.com"));
        assert_eq!(reparsed.subject, "Quarterly report");
        assert_eq!(reparsed.from_addr, "Alice <alice@example.com>");
        assert_eq!(reparsed.body_text.unwrap().trim(), "Numbers attached.");
    }

    #[test]
    fn attachments_survive_a_rebuild() {
        let (email, _) = archived();
        let attachments = vec![EmailAttachment {
            filename: "q4.csv".into(),
            content_type: "text/csv".into(),
            content: b"a,b\n1,2\n".to_vec(),
            ..EmailAttachment::default()
        }];

        let bytes = encode(&email, &attachments).unwrap();
        let reparsed = parse_email(&bytes).unwrap();
        assert_eq!(reparsed.attachments.len(), 1);
        assert_eq!(reparsed.attachments[0].filename, "q4.csv");
        assert_eq!(reparsed.attachments[0].content, b"a,b\n1,2\n");
    }
}
