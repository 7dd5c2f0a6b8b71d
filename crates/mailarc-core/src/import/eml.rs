//! Batch EML import. One file is one message.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::archive_one;
use crate::account::MailAccountId;
use crate::archive::ArchiveRepository;
use crate::job::{ImportProgress, JobOutcome, Pacer, PacingConfig};
use crate::{Error, Result};

/// Import a batch of EML files into an account as one job.
///
/// An unreadable or unparseable file counts as a malformed skip; the
/// batch keeps going.
///
/// # Errors
///
/// Returns an error when storage fails, or [`Error::Cancelled`] when the
/// token trips between files.
pub async fn import_eml_files(
    archive: &ArchiveRepository,
    account_id: MailAccountId,
    folder: &str,
    paths: &[PathBuf],
    pacing: PacingConfig,
    progress: &ImportProgress,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    progress
        .estimated_total
        .store(paths.len() as u64, Ordering::Relaxed);

    let mut bytes_total = 0;
    for path in paths {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            bytes_total += meta.len();
        }
    }
    progress.bytes_total.store(bytes_total, Ordering::Relaxed);

    let mut pacer = Pacer::new(pacing);
    for path in paths {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        pacer.pace().await;

        match tokio::fs::read(path).await {
            Ok(raw) => {
                archive_one(archive, account_id, folder, &raw, progress).await?;
                progress
                    .bytes_processed
                    .fetch_add(raw.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable EML file");
                progress.processed.fetch_add(1, Ordering::Relaxed);
                progress.skipped_malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    let skipped = progress.skipped_malformed.load(Ordering::Relaxed);
    info!(
        files = paths.len(),
        imported = progress.imported.load(Ordering::Relaxed),
        duplicates = progress.duplicates.load(Ordering::Relaxed),
        skipped,
        "EML import finished"
    );
    Ok(if skipped == 0 {
        JobOutcome::Clean
    } else {
        JobOutcome::WithErrors
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn eml_file(dir: &tempfile::TempDir, name: &str, raw: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(raw).unwrap();
        path
    }

    #[tokio::test]
    async fn batch_imports_and_reports_per_file_results() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            eml_file(&dir, "a.eml", b"Message-ID: <a@x>\nSubject: a\n\nbody a\n"),
            eml_file(&dir, "bad.eml", b"no headers at all\n"),
            eml_file(&dir, "b.eml", b"Message-ID: <b@x>\nSubject: b\n\nbody b\n"),
            dir.path().join("missing.eml"),
        ];

        let archive = ArchiveRepository::in_memory().await.unwrap();
        let progress = ImportProgress::default();
        let account = MailAccountId::new(1);

        let outcome = import_eml_files(
            &archive,
            account,
            "Import",
            &paths,
            PacingConfig::unpaced(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, JobOutcome::WithErrors);
        assert_eq!(progress.imported.load(Ordering::Relaxed), 2);
        assert_eq!(progress.skipped_malformed.load(Ordering::Relaxed), 2);
        assert_eq!(progress.estimated_total.load(Ordering::Relaxed), 4);
        assert_eq!(archive.count_for_account(account).await.unwrap(), 2);
    }
}
