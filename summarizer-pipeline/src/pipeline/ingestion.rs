use std::path::{Path, PathBuf};

use anyhow::Context;
use common::error::AppError;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use super::config::SummarizerTuning;
use crate::services::{BatchStatus, DocumentUpload, RemoteServices};

/// Reads one document into memory. The file handle only lives inside
/// this call, so it is released whether or not the upload that follows
/// succeeds.
pub(crate) async fn read_document(path: &Path) -> Result<DocumentUpload, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading document {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            AppError::Validation(format!("document path {} has no file name", path.display()))
        })?;

    Ok(DocumentUpload { file_name, bytes })
}

/// Uploads all documents as one batch into the container and polls
/// until the batch reaches a terminal status.
///
/// Returns once the batch is `completed`; any other terminal status
/// surfaces as `IngestionFailure` carrying the observed status string.
/// The poll is bounded by `tuning.ingestion_timeout_secs`.
pub async fn ingest_documents(
    services: &dyn RemoteServices,
    container_id: &str,
    file_paths: &[PathBuf],
    tuning: &SummarizerTuning,
) -> Result<(), AppError> {
    if file_paths.is_empty() {
        return Err(AppError::Validation(
            "at least one document path is required".to_string(),
        ));
    }

    let mut documents = Vec::with_capacity(file_paths.len());
    for path in file_paths {
        documents.push(read_document(path).await?);
    }

    let batch_id = services.upload_batch(container_id, documents).await?;
    debug!(
        container_id = %container_id,
        batch_id = %batch_id,
        document_count = file_paths.len(),
        "document batch submitted"
    );

    let poll_interval = Duration::from_millis(tuning.batch_poll_interval_ms);
    let deadline = Instant::now() + Duration::from_secs(tuning.ingestion_timeout_secs);

    loop {
        match services.batch_status(container_id, &batch_id).await? {
            BatchStatus::Completed => {
                info!(container_id = %container_id, batch_id = %batch_id, "document batch indexed");
                return Ok(());
            }
            BatchStatus::InProgress => {
                if Instant::now() >= deadline {
                    return Err(AppError::Timeout("document batch indexing".to_string()));
                }
                sleep(poll_interval).await;
            }
            status => return Err(AppError::IngestionFailure(status.to_string())),
        }
    }
}
