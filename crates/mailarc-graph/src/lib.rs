//! # mailarc-graph
//!
//! Microsoft Graph (M365) mail client for the `MailArc` email archiver.
//!
//! Exposes the mailbox operations the archiver needs (folder listing,
//! time-bounded message listing, raw MIME download/upload, message
//! deletion) over app-only client credentials authentication.
//! Tokens are cached until shortly before expiry and 429 responses are
//! retried honoring `Retry-After`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod token;

pub use client::{GraphClient, GraphConfig, MailFolder, MessageMeta};
pub use error::{Error, Result};
pub use token::Token;
