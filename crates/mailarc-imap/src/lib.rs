//! # mailarc-imap
//!
//! IMAP transport adapter for the `MailArc` email archiver.
//!
//! This crate wraps the `async-imap` protocol codec behind the small set of
//! operations the archiver needs: folder listing, `SINCE`-bounded searches,
//! raw RFC822 fetches, `APPEND` for restores, and delete-with-expunge for
//! server-side retention. The wire protocol itself is treated as opaque.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod session;

pub use config::ImapConfig;
pub use error::{Error, Result};
pub use session::{ImapSession, RawMessage, connect};
