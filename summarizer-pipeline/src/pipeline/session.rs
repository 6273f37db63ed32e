use std::path::Path;

use common::error::AppError;
use tracing::debug;

use super::ingestion::read_document;
use crate::services::RemoteServices;

/// One conversation carrying a single question and its anchor
/// attachment. Never reused across queries.
#[derive(Debug, Clone)]
pub struct QuerySession {
    pub id: String,
    pub anchor_document_id: String,
}

/// Uploads the anchor document through the dedicated single-file path.
///
/// The anchor upload is independent of batch ingestion. If reading or
/// uploading the anchor fails, the query is abandoned as
/// `AttachmentFailure` before any session or run exists. The returned
/// id must be recorded for cleanup before any further remote call.
pub async fn upload_anchor(
    services: &dyn RemoteServices,
    anchor_path: &Path,
) -> Result<String, AppError> {
    let document = read_document(anchor_path)
        .await
        .map_err(|err| AppError::AttachmentFailure(err.to_string()))?;
    services
        .upload_document(document)
        .await
        .map_err(|err| AppError::AttachmentFailure(err.to_string()))
}

/// Opens a session whose sole message carries the question and the
/// already-uploaded anchor attachment.
pub async fn open_session(
    services: &dyn RemoteServices,
    question: &str,
    anchor_document_id: &str,
) -> Result<QuerySession, AppError> {
    let id = services.create_session(question, anchor_document_id).await?;
    debug!(
        session_id = %id,
        anchor_document_id = %anchor_document_id,
        "query session opened"
    );

    Ok(QuerySession {
        id,
        anchor_document_id: anchor_document_id.to_owned(),
    })
}
