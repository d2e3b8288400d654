//! Course completion detection.
//!
//! The detector reads an explicit [`GradeSnapshot`] rather than reaching into
//! any global store, and decides whether the host should hear "complete" or
//! "incomplete". It is a one-way latch per distinct aggregate grade.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A learner's aggregate course grade. Compared structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
}

impl Grade {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            possible: None,
            letter: None,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.score.is_finite()
    }
}

/// A content item that contributes to the course grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradableItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Course-wide grade state for one learner at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeSnapshot {
    pub learner_id: String,
    #[serde(default)]
    pub aggregate: Option<Grade>,
    #[serde(default)]
    pub items: Vec<GradableItem>,
    /// Per-item grades by item id. Missing, `null` or non-finite means
    /// ungraded.
    #[serde(default)]
    pub item_grades: BTreeMap<String, Option<f64>>,
}

impl GradeSnapshot {
    /// Gradable items without a finite grade for this learner.
    pub fn ungraded_items(&self) -> Vec<&GradableItem> {
        self.items
            .iter()
            .filter(|item| {
                !self
                    .item_grades
                    .get(&item.id)
                    .copied()
                    .flatten()
                    .is_some_and(f64::is_finite)
            })
            .collect()
    }
}

/// Message written to the host notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostNotification {
    Incomplete,
    Complete { grade: Grade },
}

/// What has already been posted during this course session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionState {
    pub last_posted_grade: Option<Grade>,
    pub incomplete_posted: bool,
}

/// Decides completion notifications for one course session.
#[derive(Debug, Default)]
pub struct CompletionDetector {
    state: CompletionState,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CompletionState {
        &self.state
    }

    /// Evaluate one snapshot and return the notification to post, if any.
    ///
    /// While any item is ungraded, "incomplete" is posted once per session.
    /// Otherwise a finite aggregate grade that differs from the last posted
    /// one is posted as "complete".
    ///
    /// Only "complete" needs a finite aggregate: it is the payload that gets
    /// posted. Ungraded items alone decide "incomplete", so a course with no
    /// aggregate yet still reports it.
    pub fn evaluate(&mut self, snapshot: &GradeSnapshot) -> Option<HostNotification> {
        let ungraded = snapshot.ungraded_items();
        if !ungraded.is_empty() {
            tracing::debug!(
                learner = %snapshot.learner_id,
                ungraded = ungraded.len(),
                "course not complete"
            );
            if self.state.incomplete_posted {
                return None;
            }
            self.state.incomplete_posted = true;
            return Some(HostNotification::Incomplete);
        }

        let grade = snapshot.aggregate.as_ref().filter(|g| g.is_finite())?;
        if self.state.last_posted_grade.as_ref() == Some(grade) {
            return None;
        }

        tracing::info!(learner = %snapshot.learner_id, score = grade.score, "course complete");
        self.state.last_posted_grade = Some(grade.clone());
        Some(HostNotification::Complete {
            grade: grade.clone(),
        })
    }
}
