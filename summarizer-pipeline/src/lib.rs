#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod services;

use std::{path::PathBuf, sync::Arc};

use common::error::AppError;
pub use pipeline::{
    AnswerPolicy, EngineConfig, FileSummarizer, KnowledgeContainer, QuerySession,
    SummarizerConfig, SummarizerTuning,
};
pub use services::{
    BatchStatus, DocumentUpload, OpenAiServices, RemoteServices, RunEvent, RunEventStream,
};
use tracing::warn;

/// Runs a single summarization query with guaranteed teardown of the
/// remotely allocated resources.
///
/// Cleanup is always attempted, on success and on every failure path.
/// A cleanup failure is returned only when the query itself succeeded;
/// when an earlier error is already propagating it is logged instead,
/// so it never masks the original failure.
pub async fn summarize_scoped(
    services: Arc<dyn RemoteServices>,
    config: SummarizerConfig,
    file_paths: &[PathBuf],
    question: &str,
) -> Result<String, AppError> {
    let summarizer = FileSummarizer::with_services(services, config).await?;
    let result = summarizer.summarize_files(file_paths, question).await;
    let cleanup_result = summarizer.cleanup().await;

    match (result, cleanup_result) {
        (Ok(answer), Ok(())) => Ok(answer),
        (Ok(_), Err(cleanup_err)) => Err(cleanup_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup_err)) => {
            warn!(
                error = %cleanup_err,
                "cleanup failed while handling an earlier error"
            );
            Err(err)
        }
    }
}
