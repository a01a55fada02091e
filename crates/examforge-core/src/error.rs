//! Engine error types.
//!
//! Every variant is fatal to the single report being generated. Recoverable
//! problems (malformed blocks, missing key entries, degenerate reliability
//! input) are collected as flags and warnings on the reports instead.

use thiserror::Error;

use crate::model::QuestionId;

/// Errors that abort generation of one report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The extraction feed produced no usable question blocks.
    #[error("document contains no question blocks")]
    EmptyDocument,

    /// The response matrix references a question the exam does not contain.
    #[error("response matrix references question {question_id}, which is not in the exam")]
    DimensionMismatch { question_id: QuestionId },

    /// The input is larger than the configured ceiling for this computation.
    #[error("{what} of {actual} exceeds the configured limit of {limit}")]
    SizeLimitExceeded {
        what: &'static str,
        actual: usize,
        limit: usize,
    },

    /// The engine call did not finish within the caller's deadline.
    #[error("analysis timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The answer key cannot score the questions the responses refer to.
    #[error("answer key has no entry for question(s) {}", format_ids(.question_ids))]
    MissingAnswerKey { question_ids: Vec<QuestionId> },

    /// The exam violates a structural invariant (duplicate ids, bad labels).
    #[error("invalid exam: {0}")]
    InvalidExam(String),

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The worker running the computation panicked or was cancelled.
    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    /// Returns `true` if re-running the same call may succeed.
    ///
    /// Engine calls have no side effects, so a retry is always safe; it is
    /// only useful for failures that do not depend on the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Timeout { .. } | AnalysisError::Task(_))
    }
}

fn format_ids(ids: &[QuestionId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for engine calls.
pub type Result<T> = std::result::Result<T, AnalysisError>;
