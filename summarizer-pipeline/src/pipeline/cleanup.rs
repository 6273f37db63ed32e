use common::error::AppError;
use tracing::{info, warn};

use super::container::KnowledgeContainer;
use crate::services::RemoteServices;

/// Deletes every document belonging to the container, any anchor
/// documents uploaded alongside it, and finally the container itself.
///
/// Individual delete failures never abort the loop; they are collected
/// and surfaced as one `CleanupFailure` after every deletion was
/// attempted. Missing remote objects are ignored, so calling this
/// twice is safe.
pub async fn cleanup_resources(
    services: &dyn RemoteServices,
    container: &KnowledgeContainer,
    anchor_document_ids: &[String],
) -> Result<(), AppError> {
    let mut failures = Vec::new();

    let document_ids = match services.list_container_documents(&container.id).await {
        Ok(ids) => ids,
        Err(err) => {
            failures.push(format!("listing documents in {}: {err}", container.id));
            Vec::new()
        }
    };

    for document_id in &document_ids {
        if let Err(err) = services
            .delete_container_document(&container.id, document_id)
            .await
        {
            warn!(
                container_id = %container.id,
                document_id = %document_id,
                error = %err,
                "failed to delete container document during cleanup"
            );
            failures.push(format!("document {document_id}: {err}"));
        }
    }

    for document_id in anchor_document_ids {
        if let Err(err) = services.delete_document(document_id).await {
            warn!(
                document_id = %document_id,
                error = %err,
                "failed to delete anchor document during cleanup"
            );
            failures.push(format!("anchor document {document_id}: {err}"));
        }
    }

    if let Err(err) = services.delete_container(&container.id).await {
        failures.push(format!("container {}: {err}", container.id));
    }

    if failures.is_empty() {
        info!(
            container_id = %container.id,
            document_count = document_ids.len(),
            anchor_count = anchor_document_ids.len(),
            "knowledge container destroyed"
        );
        Ok(())
    } else {
        Err(AppError::CleanupFailure(failures))
    }
}
