//! Export job body: stream a selection into an artifact file.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::accesslog::{AccessLogRepository, AccessType};
use crate::archive::{ArchiveRepository, ArchivedEmail, ArchivedEmailId};
use crate::codec::{ExportFormat, csv, eml, json, mbox};
use crate::job::{ExportArtifact, ExportProgress, JobId, JobOutcome};
use crate::{Error, Result};

/// What an export covers.
#[derive(Debug, Clone)]
pub enum ExportSelection {
    /// An explicit list of archived emails.
    Emails(Vec<ArchivedEmailId>),
    /// Every email of one account.
    Account(crate::account::MailAccountId),
}

/// Run one export job. Locked emails are included; exporting is a read.
#[allow(clippy::too_many_arguments)]
pub(super) async fn run_export(
    archive: &ArchiveRepository,
    access_log: &AccessLogRepository,
    artifact_dir: &Path,
    selection: &ExportSelection,
    format: ExportFormat,
    job_id: JobId,
    user: &str,
    progress: &ExportProgress,
    cancel: &CancellationToken,
) -> Result<JobOutcome> {
    let ids = match selection {
        ExportSelection::Emails(ids) => ids.clone(),
        ExportSelection::Account(account_id) => archive.list_ids_for_account(*account_id).await?,
    };
    progress
        .total_emails
        .store(ids.len() as u64, Ordering::Relaxed);

    fs::create_dir_all(artifact_dir).await?;
    let path = artifact_path(artifact_dir, job_id, format);

    match format {
        ExportFormat::Eml => export_eml(archive, &path, &ids, progress, cancel).await?,
        ExportFormat::Mbox => export_mbox(archive, &path, &ids, progress, cancel).await?,
        ExportFormat::Csv => export_csv(archive, &path, &ids, progress, cancel).await?,
        ExportFormat::Json => export_json(archive, &path, &ids, progress, cancel).await?,
    }

    let size_bytes = artifact_size(&path).await?;
    progress.set_output(ExportArtifact {
        path: path.clone(),
        size_bytes,
    });

    access_log
        .log(
            user,
            AccessType::Download,
            &format!("exported {} emails to {}", ids.len(), path.display()),
        )
        .await?;
    info!(emails = ids.len(), path = %path.display(), size_bytes, "export finished");
    Ok(JobOutcome::Clean)
}

fn artifact_path(dir: &Path, job_id: JobId, format: ExportFormat) -> PathBuf {
    match format {
        // EML exports are a directory of one file per message.
        ExportFormat::Eml => dir.join(format!("export-{job_id}")),
        _ => dir.join(format!("export-{job_id}.{}", format.extension())),
    }
}

async fn export_eml(
    archive: &ArchiveRepository,
    dir: &PathBuf,
    ids: &[ArchivedEmailId],
    progress: &ExportProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    fs::create_dir_all(dir).await?;
    for (index, &id) in ids.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let raw = message_bytes(archive, id).await?;
        fs::write(dir.join(format!("{:06}-{}.eml", index + 1, id.0)), raw).await?;
        progress.processed_emails.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

async fn export_mbox(
    archive: &ArchiveRepository,
    path: &PathBuf,
    ids: &[ArchivedEmailId],
    progress: &ExportProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    for &id in ids {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let email = archive.get_required(id).await?;
        let raw = message_bytes(archive, id).await?;
        let envelope = envelope_address(&email);
        file.write_all(&mbox::encode_message(&envelope, email.received_at, &raw))
            .await?;
        progress.processed_emails.fetch_add(1, Ordering::Relaxed);
    }
    file.flush().await?;
    Ok(())
}

async fn export_csv(
    archive: &ArchiveRepository,
    path: &PathBuf,
    ids: &[ArchivedEmailId],
    progress: &ExportProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(csv::header_row().as_bytes()).await?;
    for &id in ids {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let email = archive.get_required(id).await?;
        file.write_all(csv::encode_row(&email).as_bytes()).await?;
        progress.processed_emails.fetch_add(1, Ordering::Relaxed);
    }
    file.flush().await?;
    Ok(())
}

async fn export_json(
    archive: &ArchiveRepository,
    path: &PathBuf,
    ids: &[ArchivedEmailId],
    progress: &ExportProgress,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(b"[").await?;
    for (index, &id) in ids.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if index > 0 {
            file.write_all(b",").await?;
        }
        let email = archive.get_required(id).await?;
        let record = serde_json::to_vec_pretty(&json::ExportRecord::from(&email))?;
        file.write_all(b"\n").await?;
        file.write_all(&record).await?;
        progress.processed_emails.fetch_add(1, Ordering::Relaxed);
    }
    file.write_all(b"\n]\n").await?;
    file.flush().await?;
    Ok(())
}

/// Raw RFC822 bytes: stored copy when present, rebuild otherwise.
async fn message_bytes(archive: &ArchiveRepository, id: ArchivedEmailId) -> Result<Vec<u8>> {
    let email = archive.get_required(id).await?;
    if let Some(raw) = &email.body_raw {
        return Ok(raw.clone());
    }
    let attachments = archive.attachments(id).await?;
    eml::encode(&email, &attachments)
}

/// mbox postmark envelope: the bare address out of the stored sender.
fn envelope_address(email: &ArchivedEmail) -> String {
    let from = email.from_addr.trim();
    if let (Some(open), Some(close)) = (from.rfind('<'), from.rfind('>')) {
        if open < close {
            return from[open + 1..close].to_string();
        }
    }
    if from.is_empty() {
        "MAILER-DAEMON".to_string()
    } else {
        from.to_string()
    }
}

async fn artifact_size(path: &Path) -> Result<u64> {
    let meta = fs::metadata(path).await?;
    if meta.is_dir() {
        let mut total = 0;
        let mut entries = fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            total += entry.metadata().await?.len();
        }
        Ok(total)
    } else {
        Ok(meta.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MailAccountId;
    use chrono::Utc;

    fn email_from(from: &str) -> ArchivedEmail {
        ArchivedEmail {
            account_id: MailAccountId::new(1),
            from_addr: from.into(),
            received_at: Utc::now(),
            ..ArchivedEmail::default()
        }
    }

    #[test]
    fn envelope_extracts_bare_address() {
        assert_eq!(
            envelope_address(&email_from("Alice <alice@example.com>")),
            "alice@example.com"
        );
        assert_eq!(
            envelope_address(&email_from("bob@example.com")),
            "bob@example.com"
        );
        assert_eq!(envelope_address(&email_from("")), "MAILER-DAEMON");
    }
}
