//! # mailarc-core
//!
//! Core engine of the `MailArc` email archiver: account management with
//! validation, the archived-email store with content hashing and dedup,
//! provider services over IMAP and Microsoft Graph, local file imports,
//! export codecs, retention, and the background job subsystem that runs
//! all of it.
//!
//! The [`service::ArchiveService`] facade ties the pieces together;
//! outer layers (a UI or HTTP surface) are expected to sit on top of it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod accesslog;
pub mod account;
pub mod archive;
pub mod codec;
mod error;
pub mod import;
pub mod job;
pub mod provider;
pub mod retention;
pub mod service;

pub use error::{Error, Result};
