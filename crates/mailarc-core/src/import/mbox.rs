//! Streaming mbox import.

use std::path::Path;
use std::sync::atomic::Ordering;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::archive_one;
use crate::account::MailAccountId;
use crate::archive::ArchiveRepository;
use crate::codec::mbox::MboxReader;
use crate::job::{ImportProgress, JobOutcome, Pacer, PacingConfig};
use crate::{Error, Result};

/// Observed average size of a stored email, used to estimate message
/// counts before the file has been read.
const AVERAGE_MESSAGE_BYTES: u64 = 75 * 1024;

/// Estimate how many messages an mbox file of `file_size` bytes holds.
#[must_use]
pub const fn estimate_message_count(file_size: u64) -> u64 {
    let estimate = file_size / AVERAGE_MESSAGE_BYTES;
    if estimate == 0 { 1 } else { estimate }
}

/// Import every message of an mbox file into an account.
///
/// The file is streamed; progress tracks consumed bytes against the file
/// size, with the estimated message count as a secondary signal.
///
/// # Errors
///
/// Returns an error when the file cannot be read, when storage fails, or
/// [`Error::Cancelled`] when the token trips between messages.
pub async fn import_mbox_file(
    archive: &ArchiveRepository,
    account_id: MailAccountId,
    folder: &str,
    path: &Path,
    pacing: PacingConfig,
    progress: &ImportProgress,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    let file_size = tokio::fs::metadata(path).await?.len();
    progress.bytes_total.store(file_size, Ordering::Relaxed);
    progress
        .estimated_total
        .store(estimate_message_count(file_size), Ordering::Relaxed);

    let file = File::open(path).await?;
    let mut reader = MboxReader::new(BufReader::new(file));
    let mut pacer = Pacer::new(pacing);

    while let Some(raw) = reader.next_message().await? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        pacer.pace().await;

        archive_one(archive, account_id, folder, &raw, progress).await?;
        progress
            .bytes_processed
            .store(reader.bytes_read(), Ordering::Relaxed);
    }

    let skipped = progress.skipped_malformed.load(Ordering::Relaxed);
    info!(
        path = %path.display(),
        imported = progress.imported.load(Ordering::Relaxed),
        duplicates = progress.duplicates.load(Ordering::Relaxed),
        skipped,
        "mbox import finished"
    );
    Ok(if skipped == 0 {
        JobOutcome::Clean
    } else {
        JobOutcome::WithErrors
    })
}
