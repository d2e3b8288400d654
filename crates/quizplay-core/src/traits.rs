//! Collaborator trait definitions.
//!
//! The engine never talks to storage, scoring or the host directly. These
//! async traits are implemented by the `quizplay-services` crate.
//! Implementations report failures as `anyhow::Error`, ideally wrapping an
//! [`EngineError`](crate::error::EngineError) so callers can classify them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::completion::{GradeSnapshot, HostNotification};
use crate::model::{Question, Response, Score};

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Durable storage for learner responses.
#[async_trait]
pub trait PersistenceService: Send + Sync {
    /// Commit one question's response. `None` clears a stored answer.
    async fn save_response(&self, request: &SaveRequest) -> anyhow::Result<()>;

    /// Commit every response of an attempt in one call.
    async fn save_all(&self, request: &SaveAllRequest) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRequest {
    pub attempt_id: Uuid,
    pub question_index: usize,
    pub response: Option<Response>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAllRequest {
    pub attempt_id: Uuid,
    pub responses: BTreeMap<usize, Option<Response>>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Produces scores for committed responses, independently of saving.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Score one response. `Ok(None)` means "not scored yet".
    async fn score(
        &self,
        question: &Question,
        response: Option<&Response>,
    ) -> anyhow::Result<Option<Score>>;
}

// ---------------------------------------------------------------------------
// Grades and host notifications
// ---------------------------------------------------------------------------

/// Read access to course-wide grade state.
#[async_trait]
pub trait GradeStore: Send + Sync {
    async fn snapshot(&self, learner_id: &str) -> anyhow::Result<GradeSnapshot>;
}

/// One-way sink towards the embedding host. Fire and forget.
#[async_trait]
pub trait HostNotifier: Send + Sync {
    /// Human-readable sink name (e.g. "stdout").
    fn name(&self) -> &str;

    async fn notify(&self, notification: &HostNotification);
}
