use common::error::AppError;
use futures::StreamExt;
use state_machines::core::GuardError;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::state::idle;
use crate::services::{RunEvent, RunEventStream};

/// How completion-event text is folded into the streamed fragments.
///
/// The remote side can deliver the final answer twice: once as
/// incremental fragments and once inside the completion event. Which
/// copy wins is a policy decision, pinned by the test suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPolicy {
    /// Append the completion text after the streamed fragments. When
    /// both carry the full answer the result contains it twice.
    AppendCompletion,
    /// Keep only the completion text, discarding fragments; falls back
    /// to the fragments when the completion carried no text.
    CompletionReplaces,
}

/// Append-only assembly of the final answer. Written only while the
/// stream is live, read once after it reaches a terminal state.
struct AnswerAccumulator {
    policy: AnswerPolicy,
    fragments: String,
    completion: String,
    completed: bool,
}

impl AnswerAccumulator {
    fn new(policy: AnswerPolicy) -> Self {
        Self {
            policy,
            fragments: String::new(),
            completion: String::new(),
            completed: false,
        }
    }

    fn on_fragment(&mut self, text: Option<String>) {
        match text {
            Some(text) => self.fragments.push_str(&text),
            None => debug!("fragment event without text; skipped"),
        }
    }

    fn on_completion(&mut self, text: Option<String>) {
        self.completed = true;
        match text {
            Some(text) => self.completion.push_str(&text),
            None => debug!("completion event without text; skipped"),
        }
    }

    fn into_answer(self) -> String {
        match self.policy {
            AnswerPolicy::AppendCompletion => {
                let mut answer = self.fragments;
                answer.push_str(&self.completion);
                answer
            }
            AnswerPolicy::CompletionReplaces => {
                if self.completion.is_empty() {
                    self.fragments
                } else {
                    self.completion
                }
            }
        }
    }
}

/// Consumes the run's event stream until it reaches a terminal state
/// and returns the assembled answer text.
///
/// Malformed events are tolerated; failed runs, transport errors, and
/// streams that end without any completion surface as `StreamFailure`.
/// The whole wait is bounded by `deadline`.
pub async fn collect_answer(
    events: RunEventStream,
    policy: AnswerPolicy,
    deadline: Duration,
) -> Result<String, AppError> {
    match timeout(deadline, drive(events, policy)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout("streaming answer run".to_string())),
    }
}

async fn drive(mut events: RunEventStream, policy: AnswerPolicy) -> Result<String, AppError> {
    let mut accumulator = AnswerAccumulator::new(policy);
    let machine = idle()
        .begin()
        .map_err(|(_, guard)| map_guard_error("begin", &guard))?;
    let mut run_completed = false;

    while let Some(event) = events.next().await {
        match event {
            Ok(RunEvent::FragmentCreated { text }) => accumulator.on_fragment(text),
            Ok(RunEvent::MessageCompleted { text }) => accumulator.on_completion(text),
            Ok(RunEvent::Completed) => {
                run_completed = true;
                break;
            }
            Ok(RunEvent::Failed { message }) => {
                machine
                    .fail()
                    .map_err(|(_, guard)| map_guard_error("fail", &guard))?;
                return Err(AppError::StreamFailure(message));
            }
            Err(err) => {
                machine
                    .fail()
                    .map_err(|(_, guard)| map_guard_error("fail", &guard))?;
                return Err(AppError::StreamFailure(err.to_string()));
            }
        }
    }

    if run_completed || accumulator.completed {
        machine
            .finish()
            .map_err(|(_, guard)| map_guard_error("finish", &guard))?;
        Ok(accumulator.into_answer())
    } else {
        machine
            .fail()
            .map_err(|(_, guard)| map_guard_error("fail", &guard))?;
        Err(AppError::StreamFailure(
            "event stream ended before the run completed".to_string(),
        ))
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid answer stream transition during {event}: {guard:?}"
    ))
}
