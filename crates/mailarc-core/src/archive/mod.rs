//! Durable email archive: models, content hashing, MIME parsing, storage.

pub mod hash;
mod model;
mod parse;
mod repository;

pub use model::{ArchivedEmail, ArchivedEmailId, EmailAttachment};
pub use parse::{ParsedEmail, parse_email};
pub use repository::ArchiveRepository;
