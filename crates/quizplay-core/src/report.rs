//! Attempt report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::AnswerStatus;
use crate::model::{QuestionKind, Score};
use crate::session::AttemptSession;

/// A point-in-time snapshot of an attempt as the player sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptReport {
    /// Unique report identifier.
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub attempt_id: Uuid,
    pub title: String,
    /// Display form of the resolved navigation policy.
    pub policy: String,
    pub current_question: Option<usize>,
    pub questions: Vec<QuestionReport>,
    pub summary: AttemptSummary,
    pub last_save_failed: bool,
    pub last_save_at: Option<DateTime<Utc>>,
    pub should_exit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionReport {
    pub index: usize,
    pub kind: QuestionKind,
    /// Status as shown to the learner (correctness may be hidden).
    pub status: AnswerStatus,
    pub unsaved_edit: bool,
    pub reachable: bool,
    /// Awarded points are withheld where correctness is hidden.
    #[serde(default)]
    pub score: Option<Score>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub total: usize,
    pub answered: usize,
    pub skipped: usize,
    pub scored: usize,
    pub correct: usize,
    pub unsaved: usize,
}

impl AttemptReport {
    pub fn from_session(session: &AttemptSession) -> Self {
        let attempt = session.attempt();
        let player = session.player();
        let statuses = session.learner_statuses();
        let reachable = session.can_go_status();
        let pending = player.question_answering_states();

        let questions: Vec<QuestionReport> = attempt
            .questions
            .iter()
            .zip(statuses)
            .zip(reachable)
            .map(|((q, status), reachable)| QuestionReport {
                index: q.index,
                kind: q.kind,
                status,
                unsaved_edit: pending.contains(q.index),
                reachable,
                score: attempt.scores.get(&q.index).map(|s| s.revealed_for(q)),
            })
            .collect();

        let summary = AttemptSummary {
            total: questions.len(),
            answered: questions.iter().filter(|q| q.status.answered).count(),
            skipped: questions.iter().filter(|q| q.status.skipped).count(),
            scored: questions.iter().filter(|q| q.status.scored).count(),
            correct: questions.iter().filter(|q| q.status.correct).count(),
            unsaved: pending.len(),
        };

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            attempt_id: attempt.id,
            title: attempt.title.clone(),
            policy: session.policy().to_string(),
            current_question: player.current_question_index(),
            questions,
            summary,
            last_save_failed: player.last_save_failed(),
            last_save_at: player.last_save_timestamp(),
            should_exit: player.should_exit_player(),
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AttemptReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
