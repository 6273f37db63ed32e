use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use common::error::AppError;
use futures::stream;
use tempfile::TempDir;
use tokio::sync::Mutex;

use super::{FileSummarizer, SummarizerConfig, SummarizerTuning};
use crate::services::{BatchStatus, DocumentUpload, RemoteServices, RunEvent, RunEventStream};

struct MockRemote {
    batch_statuses: Mutex<VecDeque<BatchStatus>>,
    containers: Mutex<HashMap<String, Vec<String>>>,
    deleted_containers: Mutex<Vec<String>>,
    deleted_documents: Mutex<Vec<String>>,
    answer_events: Mutex<Option<Vec<Result<RunEvent, AppError>>>>,
    fail_anchor_upload: bool,
    fail_create_session: bool,
    undeletable_document: Option<String>,
    calls: Mutex<Vec<&'static str>>,
    counter: AtomicUsize,
}

impl MockRemote {
    fn new() -> Self {
        Self {
            batch_statuses: Mutex::new(VecDeque::new()),
            containers: Mutex::new(HashMap::new()),
            deleted_containers: Mutex::new(Vec::new()),
            deleted_documents: Mutex::new(Vec::new()),
            answer_events: Mutex::new(None),
            fail_anchor_upload: false,
            fail_create_session: false,
            undeletable_document: None,
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }

    async fn queue_batch_statuses(&self, statuses: &[BatchStatus]) {
        self.batch_statuses
            .lock()
            .await
            .extend(statuses.iter().copied());
    }

    async fn set_answer_events(&self, events: Vec<Result<RunEvent, AppError>>) {
        *self.answer_events.lock().await = Some(events);
    }

    async fn container_documents(&self, container_id: &str) -> Vec<String> {
        self.containers
            .lock()
            .await
            .get(container_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteServices for MockRemote {
    async fn create_container(&self, _name: &str) -> Result<String, AppError> {
        self.record("create_container").await;
        let id = format!("container-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().await.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn delete_container(&self, container_id: &str) -> Result<(), AppError> {
        self.record("delete_container").await;
        let mut containers = self.containers.lock().await;
        if let Some(documents) = containers.get(container_id) {
            if !documents.is_empty() {
                return Err(AppError::InternalError(
                    "container still holds documents".to_string(),
                ));
            }
            containers.remove(container_id);
        }
        self.deleted_containers
            .lock()
            .await
            .push(container_id.to_string());
        Ok(())
    }

    async fn list_container_documents(
        &self,
        container_id: &str,
    ) -> Result<Vec<String>, AppError> {
        self.record("list_container_documents").await;
        Ok(self.container_documents(container_id).await)
    }

    async fn delete_container_document(
        &self,
        container_id: &str,
        document_id: &str,
    ) -> Result<(), AppError> {
        self.record("delete_container_document").await;
        if self.undeletable_document.as_deref() == Some(document_id) {
            return Err(AppError::InternalError(format!(
                "document {document_id} refuses deletion"
            )));
        }
        if let Some(documents) = self.containers.lock().await.get_mut(container_id) {
            documents.retain(|id| id != document_id);
        }
        self.deleted_documents
            .lock()
            .await
            .push(document_id.to_string());
        Ok(())
    }

    async fn upload_batch(
        &self,
        container_id: &str,
        documents: Vec<DocumentUpload>,
    ) -> Result<String, AppError> {
        self.record("upload_batch").await;
        let mut containers = self.containers.lock().await;
        let entry = containers
            .get_mut(container_id)
            .ok_or_else(|| AppError::InternalError("unknown container".to_string()))?;
        for document in documents {
            entry.push(format!("doc-{}", document.file_name));
        }
        Ok("batch-1".to_string())
    }

    async fn batch_status(
        &self,
        _container_id: &str,
        _batch_id: &str,
    ) -> Result<BatchStatus, AppError> {
        self.record("batch_status").await;
        Ok(self
            .batch_statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or(BatchStatus::Completed))
    }

    async fn upload_document(&self, document: DocumentUpload) -> Result<String, AppError> {
        self.record("upload_document").await;
        if self.fail_anchor_upload {
            return Err(AppError::InternalError("mock upload refused".to_string()));
        }
        Ok(format!("anchor-{}", document.file_name))
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), AppError> {
        self.record("delete_document").await;
        self.deleted_documents
            .lock()
            .await
            .push(document_id.to_string());
        Ok(())
    }

    async fn create_engine(&self, _name: &str, _instructions: &str) -> Result<String, AppError> {
        self.record("create_engine").await;
        Ok("engine-1".to_string())
    }

    async fn bind_engine(&self, _engine_id: &str, _container_id: &str) -> Result<(), AppError> {
        self.record("bind_engine").await;
        Ok(())
    }

    async fn create_session(
        &self,
        _question: &str,
        _anchor_document_id: &str,
    ) -> Result<String, AppError> {
        self.record("create_session").await;
        if self.fail_create_session {
            return Err(AppError::InternalError(
                "mock session creation refused".to_string(),
            ));
        }
        Ok("session-1".to_string())
    }

    async fn start_run_stream(
        &self,
        _session_id: &str,
        _engine_id: &str,
        _instructions: &str,
    ) -> Result<RunEventStream, AppError> {
        self.record("start_run_stream").await;
        let events = self
            .answer_events
            .lock()
            .await
            .take()
            .unwrap_or_else(|| vec![Ok(RunEvent::Completed)]);
        Ok(Box::pin(stream::iter(events)))
    }
}

fn test_config() -> SummarizerConfig {
    SummarizerConfig {
        tuning: SummarizerTuning {
            batch_poll_interval_ms: 1,
            ingestion_timeout_secs: 5,
            stream_timeout_secs: 5,
        },
        ..SummarizerConfig::default()
    }
}

fn write_documents(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("contents of {name}")).expect("write test document");
            path
        })
        .collect()
}

fn fragment(text: &str) -> Result<RunEvent, AppError> {
    Ok(RunEvent::FragmentCreated {
        text: Some(text.to_string()),
    })
}

#[tokio::test]
async fn summarize_files_returns_streamed_answer_in_pipeline_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md", "b.md"]);
    let services = Arc::new(MockRemote::new());
    services
        .set_answer_events(vec![
            fragment("A "),
            fragment("summary"),
            Ok(RunEvent::MessageCompleted {
                text: Some(" done".to_string()),
            }),
            Ok(RunEvent::Completed),
        ])
        .await;

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");

    let answer = summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect("summarization succeeds");
    assert_eq!(answer, "A summary done");

    let calls = services.calls.lock().await.clone();
    assert_eq!(
        calls,
        vec![
            "create_engine",
            "create_container",
            "bind_engine",
            "upload_batch",
            "batch_status",
            "upload_document",
            "create_session",
            "start_run_stream",
        ]
    );
}

#[tokio::test]
async fn cleanup_leaves_no_documents_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md", "b.md"]);
    let services = Arc::new(MockRemote::new());

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");
    summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect("summarization succeeds");

    let container_id = summarizer.container().id.clone();
    summarizer.cleanup().await.expect("cleanup succeeds");

    assert!(services.container_documents(&container_id).await.is_empty());
    assert!(services
        .deleted_containers
        .lock()
        .await
        .contains(&container_id));
    assert!(services
        .deleted_documents
        .lock()
        .await
        .contains(&"anchor-a.md".to_string()));

    // Second call observes nothing left to delete and must not fail.
    summarizer.cleanup().await.expect("second cleanup is safe");
}

#[tokio::test]
async fn ingestion_failure_aborts_before_any_session_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md"]);
    let services = Arc::new(MockRemote::new());
    services
        .queue_batch_statuses(&[BatchStatus::InProgress, BatchStatus::Failed])
        .await;

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");

    let err = summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect_err("failed batch must abort the query");
    assert!(matches!(err, AppError::IngestionFailure(status) if status == "failed"));

    let calls = services.calls.lock().await.clone();
    assert!(!calls.contains(&"upload_document"));
    assert!(!calls.contains(&"create_session"));
    assert!(!calls.contains(&"start_run_stream"));
}

#[tokio::test]
async fn ingestion_polls_until_terminal_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md"]);
    let services = Arc::new(MockRemote::new());
    services
        .queue_batch_statuses(&[
            BatchStatus::InProgress,
            BatchStatus::InProgress,
            BatchStatus::Completed,
        ])
        .await;

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");
    summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect("summarization succeeds after polling");

    let polls = services
        .calls
        .lock()
        .await
        .iter()
        .filter(|call| **call == "batch_status")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn ingestion_poll_respects_the_deadline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md"]);
    let services = Arc::new(MockRemote::new());
    services
        .queue_batch_statuses(&[BatchStatus::InProgress])
        .await;

    let mut config = test_config();
    config.tuning.ingestion_timeout_secs = 0;
    let summarizer = FileSummarizer::with_services(services.clone(), config)
        .await
        .expect("summarizer");

    let err = summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect_err("zero deadline must time out while in progress");
    assert!(matches!(err, AppError::Timeout(_)));
}

#[tokio::test]
async fn anchor_upload_failure_aborts_run_but_not_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md", "b.md"]);
    let mut mock = MockRemote::new();
    mock.fail_anchor_upload = true;
    let services = Arc::new(mock);

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");

    let err = summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect_err("anchor upload failure must abort the query");
    assert!(matches!(err, AppError::AttachmentFailure(_)));

    let calls = services.calls.lock().await.clone();
    assert!(!calls.contains(&"create_session"));
    assert!(!calls.contains(&"start_run_stream"));

    // Documents already ingested into the container are still removed.
    let container_id = summarizer.container().id.clone();
    summarizer.cleanup().await.expect("cleanup succeeds");
    assert!(services.container_documents(&container_id).await.is_empty());
    let deleted = services.deleted_documents.lock().await.clone();
    assert!(deleted.contains(&"doc-a.md".to_string()));
    assert!(deleted.contains(&"doc-b.md".to_string()));
}

#[tokio::test]
async fn anchor_is_cleaned_up_when_session_creation_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md"]);
    let mut mock = MockRemote::new();
    mock.fail_create_session = true;
    let services = Arc::new(mock);

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");

    summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect_err("session creation failure must abort the query");
    assert!(!services.calls.lock().await.contains(&"start_run_stream"));

    // The anchor was uploaded before the session attempt; cleanup must
    // still remove it.
    summarizer.cleanup().await.expect("cleanup succeeds");
    let deleted = services.deleted_documents.lock().await.clone();
    assert!(deleted.contains(&"anchor-a.md".to_string()));
    assert!(deleted.contains(&"doc-a.md".to_string()));
}

#[tokio::test]
async fn partial_cleanup_failure_still_attempts_remaining_deletes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md", "b.md", "c.md"]);
    let mut mock = MockRemote::new();
    mock.undeletable_document = Some("doc-b.md".to_string());
    let services = Arc::new(mock);

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");
    summarizer
        .summarize_files(&paths, "Summarize")
        .await
        .expect("summarization succeeds");

    let err = summarizer
        .cleanup()
        .await
        .expect_err("stuck document must surface as cleanup failure");
    match err {
        AppError::CleanupFailure(failures) => {
            // One failure for the document, one for the container that
            // still holds it.
            assert_eq!(failures.len(), 2);
        }
        other => panic!("expected CleanupFailure, got {other:?}"),
    }

    let deleted = services.deleted_documents.lock().await.clone();
    assert!(deleted.contains(&"doc-a.md".to_string()));
    assert!(deleted.contains(&"doc-c.md".to_string()));
    assert!(!deleted.contains(&"doc-b.md".to_string()));
    assert!(services
        .calls
        .lock()
        .await
        .contains(&"delete_container"));
}

#[tokio::test]
async fn empty_inputs_are_rejected_before_any_remote_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_documents(&dir, &["a.md"]);
    let services = Arc::new(MockRemote::new());

    let summarizer = FileSummarizer::with_services(services.clone(), test_config())
        .await
        .expect("summarizer");
    let construction_calls = services.calls.lock().await.len();

    let err = summarizer
        .summarize_files(&[], "Summarize")
        .await
        .expect_err("empty path list is invalid");
    assert!(matches!(err, AppError::Validation(_)));

    let err = summarizer
        .summarize_files(&paths, "   ")
        .await
        .expect_err("blank question is invalid");
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(services.calls.lock().await.len(), construction_calls);
}
