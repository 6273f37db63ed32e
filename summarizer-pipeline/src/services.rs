use std::{fmt, pin::Pin, sync::Arc};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        AssistantStreamEvent, AssistantToolFileSearchResources, AssistantToolResources,
        AssistantTools, AssistantToolsFileSearch, CreateAssistantRequestArgs, CreateFileRequest,
        CreateMessageRequest, CreateMessageRequestContent, CreateRunRequest, CreateThreadRequest,
        CreateVectorStoreFileBatchRequest, CreateVectorStoreRequest, FileInput, FilePurpose,
        MessageAttachment, MessageAttachmentTool, MessageContent, MessageDeltaContent,
        MessageRole, ModifyAssistantRequest, VectorStoreFileBatchStatus,
    },
    Client,
};
use async_trait::async_trait;
use common::{error::AppError, utils::config::AppConfig};
use futures::{future::try_join_all, Stream, StreamExt};
use tracing::debug;

/// One document staged for upload. Holding the raw bytes here keeps
/// local file handles scoped to the read that produced them.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Status reported for a document batch while it is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Typed events dispatched while a run streams its answer. A missing
/// text payload is an `Option`, not a parse failure.
#[derive(Debug, Clone)]
pub enum RunEvent {
    FragmentCreated { text: Option<String> },
    MessageCompleted { text: Option<String> },
    Completed,
    Failed { message: String },
}

pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent, AppError>> + Send>>;

/// Boundary to the remote document and reasoning API, grouped the way
/// the orchestrator consumes it: container management, batch upload,
/// single-document upload, engine configuration, and session/run.
#[async_trait]
pub trait RemoteServices: Send + Sync {
    async fn create_container(&self, name: &str) -> Result<String, AppError>;

    /// Missing containers are ignored so cleanup stays idempotent.
    async fn delete_container(&self, container_id: &str) -> Result<(), AppError>;

    /// Lists the documents currently held by the container. A missing
    /// container yields an empty set.
    async fn list_container_documents(&self, container_id: &str)
        -> Result<Vec<String>, AppError>;

    async fn delete_container_document(
        &self,
        container_id: &str,
        document_id: &str,
    ) -> Result<(), AppError>;

    /// Submits all documents as one batch associated with the
    /// container and returns the batch id. Does not wait for indexing.
    async fn upload_batch(
        &self,
        container_id: &str,
        documents: Vec<DocumentUpload>,
    ) -> Result<String, AppError>;

    async fn batch_status(
        &self,
        container_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, AppError>;

    /// Uploads one document outside any container, for direct
    /// attachment to a session.
    async fn upload_document(&self, document: DocumentUpload) -> Result<String, AppError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), AppError>;

    async fn create_engine(&self, name: &str, instructions: &str) -> Result<String, AppError>;

    /// Points the engine's document search at `container_id`. Updates
    /// in place; later binds supersede earlier ones.
    async fn bind_engine(&self, engine_id: &str, container_id: &str) -> Result<(), AppError>;

    async fn create_session(
        &self,
        question: &str,
        anchor_document_id: &str,
    ) -> Result<String, AppError>;

    async fn start_run_stream(
        &self,
        session_id: &str,
        engine_id: &str,
        instructions: &str,
    ) -> Result<RunEventStream, AppError>;
}

/// Production implementation backed by the OpenAI assistants API:
/// vector stores as knowledge containers, assistants as engine
/// configurations, threads and runs as query sessions.
pub struct OpenAiServices {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiServices {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = Arc::new(Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));
        Self::new(client, config.summarizer_model.clone())
    }
}

fn is_not_found(err: &OpenAIError) -> bool {
    matches!(err, OpenAIError::ApiError(api) if api.code.as_deref() == Some("not_found"))
}

/// Narrows the remote event stream to the events the accumulator
/// consumes; bookkeeping events (run queued, step created, ...) are
/// dropped here.
fn map_stream_event(event: AssistantStreamEvent) -> Option<RunEvent> {
    match event {
        AssistantStreamEvent::ThreadMessageDelta(delta) => {
            let text = delta.delta.content.and_then(|blocks| {
                blocks.into_iter().find_map(|block| match block {
                    MessageDeltaContent::Text(fragment) => {
                        fragment.text.and_then(|text| text.value)
                    }
                    _ => None,
                })
            });
            Some(RunEvent::FragmentCreated { text })
        }
        AssistantStreamEvent::ThreadMessageCompleted(message) => {
            let text = message.content.into_iter().find_map(|block| match block {
                MessageContent::Text(text) => Some(text.text.value),
                _ => None,
            });
            Some(RunEvent::MessageCompleted { text })
        }
        AssistantStreamEvent::ThreadRunCompleted(_) => Some(RunEvent::Completed),
        AssistantStreamEvent::ThreadRunFailed(run)
        | AssistantStreamEvent::ThreadRunCancelled(run)
        | AssistantStreamEvent::ThreadRunExpired(run)
        | AssistantStreamEvent::ThreadRunIncomplete(run) => Some(RunEvent::Failed {
            message: run
                .last_error
                .map(|err| err.message)
                .unwrap_or_else(|| "run ended without completing".to_owned()),
        }),
        AssistantStreamEvent::ErrorEvent(err) => Some(RunEvent::Failed {
            message: format!("{err:?}"),
        }),
        _ => None,
    }
}

#[async_trait]
impl RemoteServices for OpenAiServices {
    async fn create_container(&self, name: &str) -> Result<String, AppError> {
        let store = self
            .client
            .vector_stores()
            .create(CreateVectorStoreRequest {
                name: Some(name.to_owned()),
                ..Default::default()
            })
            .await?;
        debug!(container_id = %store.id, "created vector store");
        Ok(store.id)
    }

    async fn delete_container(&self, container_id: &str) -> Result<(), AppError> {
        match self.client.vector_stores().delete(container_id).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_container_documents(
        &self,
        container_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let mut document_ids = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let vector_stores = self.client.vector_stores();
            let files = vector_stores.files(container_id);
            let page = match &after {
                Some(cursor) => {
                    files
                        .list(&[("limit", "100"), ("after", cursor.as_str())])
                        .await
                }
                None => files.list(&[("limit", "100")]).await,
            };
            let page = match page {
                Ok(page) => page,
                Err(err) if is_not_found(&err) => return Ok(Vec::new()),
                Err(err) => return Err(err.into()),
            };

            document_ids.extend(page.data.into_iter().map(|file| file.id));

            if !page.has_more {
                break;
            }
            match page.last_id {
                Some(last_id) => after = Some(last_id),
                None => break,
            }
        }

        Ok(document_ids)
    }

    async fn delete_container_document(
        &self,
        container_id: &str,
        document_id: &str,
    ) -> Result<(), AppError> {
        match self
            .client
            .vector_stores()
            .files(container_id)
            .delete(document_id)
            .await
        {
            Ok(_) => {}
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(err.into()),
        }

        // The vector store only references the file; drop the backing
        // file object as well so nothing is left in remote storage.
        self.delete_document(document_id).await
    }

    async fn upload_batch(
        &self,
        container_id: &str,
        documents: Vec<DocumentUpload>,
    ) -> Result<String, AppError> {
        let uploads = documents.into_iter().map(|document| async move {
            let file = self
                .client
                .files()
                .create(CreateFileRequest {
                    file: FileInput::from_vec_u8(document.file_name, document.bytes),
                    purpose: FilePurpose::Assistants,
                })
                .await?;
            Ok::<_, OpenAIError>(file.id)
        });
        let file_ids = try_join_all(uploads).await?;
        let file_count = file_ids.len();

        let batch = self
            .client
            .vector_stores()
            .file_batches(container_id)
            .create(CreateVectorStoreFileBatchRequest {
                file_ids,
                ..Default::default()
            })
            .await?;

        debug!(
            container_id = %container_id,
            batch_id = %batch.id,
            file_count,
            "submitted vector store file batch"
        );
        Ok(batch.id)
    }

    async fn batch_status(
        &self,
        container_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, AppError> {
        let batch = self
            .client
            .vector_stores()
            .file_batches(container_id)
            .retrieve(batch_id)
            .await?;

        let status = match batch.status {
            VectorStoreFileBatchStatus::InProgress => BatchStatus::InProgress,
            VectorStoreFileBatchStatus::Completed => BatchStatus::Completed,
            VectorStoreFileBatchStatus::Cancelled => BatchStatus::Cancelled,
            VectorStoreFileBatchStatus::Failed => BatchStatus::Failed,
        };
        Ok(status)
    }

    async fn upload_document(&self, document: DocumentUpload) -> Result<String, AppError> {
        let file = self
            .client
            .files()
            .create(CreateFileRequest {
                file: FileInput::from_vec_u8(document.file_name, document.bytes),
                purpose: FilePurpose::Assistants,
            })
            .await?;
        Ok(file.id)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), AppError> {
        match self.client.files().delete(document_id).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_engine(&self, name: &str, instructions: &str) -> Result<String, AppError> {
        let request = CreateAssistantRequestArgs::default()
            .name(name)
            .instructions(instructions)
            .model(self.model.clone())
            .tools(vec![AssistantTools::FileSearch(
                AssistantToolsFileSearch::default(),
            )])
            .build()?;
        let assistant = self.client.assistants().create(request).await?;
        debug!(engine_id = %assistant.id, "created assistant");
        Ok(assistant.id)
    }

    async fn bind_engine(&self, engine_id: &str, container_id: &str) -> Result<(), AppError> {
        let request = ModifyAssistantRequest {
            tool_resources: Some(AssistantToolResources {
                code_interpreter: None,
                file_search: Some(AssistantToolFileSearchResources {
                    vector_store_ids: vec![container_id.to_owned()],
                }),
            }),
            ..Default::default()
        };
        self.client.assistants().update(engine_id, request).await?;
        Ok(())
    }

    async fn create_session(
        &self,
        question: &str,
        anchor_document_id: &str,
    ) -> Result<String, AppError> {
        let thread = self
            .client
            .threads()
            .create(CreateThreadRequest {
                messages: Some(vec![CreateMessageRequest {
                    role: MessageRole::User,
                    content: CreateMessageRequestContent::Content(question.to_owned()),
                    attachments: Some(vec![MessageAttachment {
                        file_id: anchor_document_id.to_owned(),
                        tools: vec![MessageAttachmentTool::FileSearch],
                    }]),
                    ..Default::default()
                }]),
                ..Default::default()
            })
            .await?;
        Ok(thread.id)
    }

    async fn start_run_stream(
        &self,
        session_id: &str,
        engine_id: &str,
        instructions: &str,
    ) -> Result<RunEventStream, AppError> {
        let request = CreateRunRequest {
            assistant_id: engine_id.to_owned(),
            instructions: Some(instructions.to_owned()),
            ..Default::default()
        };
        let events = self
            .client
            .threads()
            .runs(session_id)
            .create_stream(request)
            .await?;

        let mapped = events.filter_map(|item| async move {
            match item {
                Ok(event) => map_stream_event(event).map(Ok),
                Err(err) => Some(Err(AppError::from(err))),
            }
        });
        Ok(Box::pin(mapped) as RunEventStream)
    }
}
