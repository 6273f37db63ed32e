mod cleanup;
mod config;
mod container;
mod ingestion;
mod session;
mod state;
mod stream;

pub use config::{SummarizerConfig, SummarizerTuning};
pub use container::{EngineConfig, KnowledgeContainer};
pub use session::QuerySession;
pub use stream::AnswerPolicy;

use std::{path::PathBuf, sync::Arc};

use common::{error::AppError, utils::config::AppConfig};
use tokio::{sync::Mutex, time::Duration};
use tracing::info;

use crate::services::{OpenAiServices, RemoteServices};

/// Document-grounded query orchestrator.
///
/// Each instance exclusively owns one knowledge container and one
/// reusable engine configuration, both allocated at construction.
/// Queries issued through one instance are serialized by the caller;
/// the container binding is a last-writer-wins update.
pub struct FileSummarizer {
    services: Arc<dyn RemoteServices>,
    config: SummarizerConfig,
    engine: EngineConfig,
    container: KnowledgeContainer,
    /// Anchor uploads live outside the container; remembered here so
    /// cleanup can remove them too.
    anchor_documents: Mutex<Vec<String>>,
}

impl FileSummarizer {
    /// Connects to the remote API and allocates the engine
    /// configuration and knowledge container this instance owns.
    pub async fn new(app_config: &AppConfig, config: SummarizerConfig) -> Result<Self, AppError> {
        let services = Arc::new(OpenAiServices::from_config(app_config));
        Self::with_services(services, config).await
    }

    pub async fn with_services(
        services: Arc<dyn RemoteServices>,
        config: SummarizerConfig,
    ) -> Result<Self, AppError> {
        let engine = container::create_engine(
            services.as_ref(),
            &config.engine_name,
            &config.engine_instructions,
        )
        .await?;
        let container =
            container::create_container(services.as_ref(), &config.container_name).await?;

        Ok(Self {
            services,
            config,
            engine,
            container,
            anchor_documents: Mutex::new(Vec::new()),
        })
    }

    /// Answers `question` grounded in the given documents.
    ///
    /// Rebinds the engine to this instance's container, ingests the
    /// documents as one batch, opens a session carrying the question
    /// with the first document attached as anchor, then streams the
    /// run until it is terminal. No session work starts before
    /// ingestion is terminal, and no answer is returned before the run
    /// is terminal.
    #[tracing::instrument(
        skip_all,
        fields(container_id = %self.container.id, document_count = file_paths.len())
    )]
    pub async fn summarize_files(
        &self,
        file_paths: &[PathBuf],
        question: &str,
    ) -> Result<String, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("question must not be empty".to_string()));
        }
        let anchor_path = file_paths.first().ok_or_else(|| {
            AppError::Validation("at least one document path is required".to_string())
        })?;

        container::bind_container(self.services.as_ref(), &self.engine, &self.container).await?;
        ingestion::ingest_documents(
            self.services.as_ref(),
            &self.container.id,
            file_paths,
            &self.config.tuning,
        )
        .await?;

        let anchor_document_id =
            session::upload_anchor(self.services.as_ref(), anchor_path).await?;
        // Ledgered before any call that could fail, so cleanup always
        // sees the upload.
        self.anchor_documents
            .lock()
            .await
            .push(anchor_document_id.clone());

        let session =
            session::open_session(self.services.as_ref(), question, &anchor_document_id).await?;

        let events = self
            .services
            .start_run_stream(&session.id, &self.engine.id, &self.config.run_instructions)
            .await?;
        let answer = stream::collect_answer(
            events,
            self.config.answer_policy,
            Duration::from_secs(self.config.tuning.stream_timeout_secs),
        )
        .await?;

        info!(
            session_id = %session.id,
            answer_chars = answer.chars().count(),
            "summarization run finished"
        );
        Ok(answer)
    }

    /// Tears down the container, its documents, and any anchor
    /// uploads. The engine configuration is reusable and is left in
    /// place. Safe to call more than once and safe when no query was
    /// ever issued.
    pub async fn cleanup(&self) -> Result<(), AppError> {
        let anchors = std::mem::take(&mut *self.anchor_documents.lock().await);
        cleanup::cleanup_resources(self.services.as_ref(), &self.container, &anchors).await
    }

    pub fn container(&self) -> &KnowledgeContainer {
        &self.container
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }
}

#[cfg(test)]
mod tests;
