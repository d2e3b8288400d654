//! Engine error types.
//!
//! Collaborators report failures through `anyhow::Error`; wrapping one of
//! these variants lets the session downcast and classify a failure without
//! string matching.

use thiserror::Error;

/// Errors surfaced by the attempt engine and its collaborators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The attempt settings name a navigation policy we do not know.
    #[error("unknown navigation policy: {0}")]
    UnknownPolicy(String),

    /// A question index does not exist in the attempt.
    #[error("question {index} out of range (attempt has {count} questions)")]
    QuestionOutOfRange { index: usize, count: usize },

    /// The persistence layer rejected a save for one question.
    #[error("save failed for question {index}: {reason}")]
    SaveFailed { index: usize, reason: String },

    /// The persistence layer is unavailable or rejected a bulk save.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The scoring collaborator could not produce a score.
    #[error("scoring error: {0}")]
    Scoring(String),
}

impl EngineError {
    /// Returns `true` if retrying with the same buffered edit can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::SaveFailed { .. } | EngineError::Persistence(_)
        )
    }
}
