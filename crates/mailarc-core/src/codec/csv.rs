//! CSV export of envelope fields.
//!
//! Hand-rolled RFC4180 quoting; bodies and attachments are not included.

use crate::archive::ArchivedEmail;

const COLUMNS: [&str; 9] = [
    "id",
    "message_id",
    "folder",
    "subject",
    "from",
    "to",
    "cc",
    "sent_at",
    "received_at",
];

/// The header row, including the trailing newline.
#[must_use]
pub fn header_row() -> String {
    let mut row = COLUMNS.join(",");
    row.push_str("\r\n");
    row
}

/// One record row, including the trailing newline.
#[must_use]
pub fn encode_row(email: &ArchivedEmail) -> String {
    let fields = [
        email.id.map(|id| id.0.to_string()).unwrap_or_default(),
        email.message_id.clone(),
        email.folder_name.clone(),
        email.subject.clone(),
        email.from_addr.clone(),
        email.to_addrs.join("; "),
        email.cc_addrs.join("; "),
        email
            .sent_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_default(),
        email.received_at.to_rfc3339(),
    ];

    let mut row = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            row.push(',');
        }
        row.push_str(&escape(field));
    }
    row.push_str("\r\n");
    row
}

/// RFC4180: quote when the field contains a comma, quote or line break;
/// embedded quotes double.
fn escape(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
