//! Encoders and decoders for archive interchange formats.

pub mod csv;
pub mod eml;
pub mod json;
pub mod mbox;

use serde::{Deserialize, Serialize};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One RFC822 file per message, zipped semantics left to callers.
    Eml,
    /// Single mbox file.
    Mbox,
    /// Envelope fields as CSV.
    Csv,
    /// Envelope fields as a JSON array.
    Json,
}

impl ExportFormat {
    /// File extension for artifacts of this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Eml => "eml",
            Self::Mbox => "mbox",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}
