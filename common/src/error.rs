use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Document batch finished with status: {0}")]
    IngestionFailure(String),
    #[error("Anchor document upload failed: {0}")]
    AttachmentFailure(String),
    #[error("Answer stream failed: {0}")]
    StreamFailure(String),
    #[error("Cleanup failed: {}", .0.join("; "))]
    CleanupFailure(Vec<String>),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
