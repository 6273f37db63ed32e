use super::stream::AnswerPolicy;

/// Bounds for the two blocking waits: the batch indexing poll and the
/// answer stream.
#[derive(Debug, Clone)]
pub struct SummarizerTuning {
    pub batch_poll_interval_ms: u64,
    pub ingestion_timeout_secs: u64,
    pub stream_timeout_secs: u64,
}

impl Default for SummarizerTuning {
    fn default() -> Self {
        Self {
            batch_poll_interval_ms: 500,
            ingestion_timeout_secs: 120,
            stream_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub container_name: String,
    pub engine_name: String,
    pub engine_instructions: String,
    pub run_instructions: String,
    pub answer_policy: AnswerPolicy,
    pub tuning: SummarizerTuning,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            container_name: "file-summarizer-store".to_string(),
            engine_name: "file-summarizer".to_string(),
            engine_instructions: "You are a summarization assistant. Summarize the content of \
                                  the files provided to you."
                .to_string(),
            run_instructions: "Use the documents attached and the knowledge container bound to \
                               this run to answer the question as accurately and completely as \
                               possible."
                .to_string(),
            answer_policy: AnswerPolicy::AppendCompletion,
            tuning: SummarizerTuning::default(),
        }
    }
}
