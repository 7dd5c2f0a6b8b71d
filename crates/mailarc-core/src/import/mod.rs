//! Local file import engines (mbox and EML).
//!
//! Both engines funnel every message through [`archive_one`]: parse,
//! duplicate checks, store. A message that fails to parse is counted and
//! skipped; the import never aborts because of one bad input.

mod eml;
mod mbox;

pub use eml::import_eml_files;
pub use mbox::{estimate_message_count, import_mbox_file};

use std::sync::atomic::Ordering;

use tracing::warn;

use crate::Result;
use crate::account::MailAccountId;
use crate::archive::{ArchiveRepository, hash, parse_email};
use crate::job::ImportProgress;

/// Parse and archive one raw message, updating the import counters.
///
/// Duplicates (by content hash or dedup key) and malformed messages are
/// counted and skipped. Only storage failures propagate.
pub(crate) async fn archive_one(
    archive: &ArchiveRepository,
    account_id: MailAccountId,
    folder: &str,
    raw: &[u8],
    progress: &ImportProgress,
) -> Result<()> {
    progress.processed.fetch_add(1, Ordering::Relaxed);

    let parsed = match parse_email(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "skipping malformed message");
            progress.skipped_malformed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
    };

    let content_hash = hash::content_hash(&parsed);
    if archive.hash_exists(account_id, &content_hash).await?
        || archive.exists(account_id, &parsed.dedup_message_id()).await?
    {
        progress.duplicates.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    let received_at = parsed.sent_at;
    let (mut email, attachments) = parsed.into_archived(account_id, folder, received_at, raw);
    archive.insert(&mut email, &attachments).await?;
    progress.imported.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
