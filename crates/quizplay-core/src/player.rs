//! Per-attempt player state machine.
//!
//! [`AttemptPlayerState`] changes only through [`PlayerEvent`]s. Applying an
//! event has no side effects. Persistence and navigation gating happen
//! outside and are fed back in as further events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Response;

/// Unsaved edits keyed by question index.
///
/// A present entry means the learner changed that question since its last
/// acknowledged save. The entry value may itself be `None` when the learner
/// cleared their answer. Entries are removed only by save acknowledgments
/// or an explicit reset; a failed save leaves them in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerBuffer {
    edits: BTreeMap<usize, Option<Response>>,
}

impl AnswerBuffer {
    pub fn insert(&mut self, index: usize, response: Option<Response>) {
        self.edits.insert(index, response);
    }

    /// Drop the edit for `index`, returning it if there was one.
    pub fn clear(&mut self, index: usize) -> Option<Option<Response>> {
        self.edits.remove(&index)
    }

    pub fn clear_all(&mut self) {
        self.edits.clear();
    }

    /// The unsaved edit for `index`. The outer `None` means no edit.
    pub fn get(&self, index: usize) -> Option<&Option<Response>> {
        self.edits.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.edits.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.edits.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<&Response>)> {
        self.edits.iter().map(|(i, r)| (*i, r.as_ref()))
    }
}

/// Inputs to the player state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ExitRequested,
    ExitAcknowledged,
    /// Move to `target` (`None` deselects). The caller must already have
    /// confirmed the move with [`crate::navigation::can_go`].
    NavigatedTo {
        target: Option<usize>,
        /// Abandon the unsaved edit at this index before moving.
        reset_index: Option<usize>,
    },
    /// Ignored when `question_index` is `None`.
    AnswerChanged {
        question_index: Option<usize>,
        response: Option<Response>,
    },
    QuestionSaved { question_index: usize },
    AllQuestionsSaved,
    SaveFailed,
}

/// Mutable per-attempt state of the player view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptPlayerState {
    current_question_index: Option<usize>,
    question_answering_states: AnswerBuffer,
    last_change_timestamp: Option<DateTime<Utc>>,
    last_save_timestamp: Option<DateTime<Utc>>,
    last_save_failed: bool,
    should_exit_player: bool,
}

impl AttemptPlayerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure reducer form of [`AttemptPlayerState::apply`].
    pub fn reduce(mut self, event: PlayerEvent, now: DateTime<Utc>) -> Self {
        self.apply(event, now);
        self
    }

    /// Apply one event. `now` stamps change and save times.
    pub fn apply(&mut self, event: PlayerEvent, now: DateTime<Utc>) {
        tracing::debug!(?event, "player transition");
        match event {
            PlayerEvent::ExitRequested => self.should_exit_player = true,
            PlayerEvent::ExitAcknowledged => self.should_exit_player = false,
            PlayerEvent::NavigatedTo {
                target,
                reset_index,
            } => {
                if let Some(reset) = reset_index {
                    self.question_answering_states.clear(reset);
                }
                self.current_question_index = target;
            }
            PlayerEvent::AnswerChanged {
                question_index,
                response,
            } => {
                if let Some(index) = question_index {
                    self.question_answering_states.insert(index, response);
                    self.last_change_timestamp = Some(now);
                }
            }
            PlayerEvent::QuestionSaved { question_index } => {
                self.question_answering_states.clear(question_index);
                self.last_save_timestamp = Some(now);
                self.last_save_failed = false;
            }
            PlayerEvent::AllQuestionsSaved => {
                self.question_answering_states.clear_all();
                self.last_save_timestamp = Some(now);
                self.last_save_failed = false;
            }
            PlayerEvent::SaveFailed => self.last_save_failed = true,
        }
    }

    pub fn current_question_index(&self) -> Option<usize> {
        self.current_question_index
    }

    pub fn question_answering_states(&self) -> &AnswerBuffer {
        &self.question_answering_states
    }

    pub fn last_change_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_change_timestamp
    }

    pub fn last_save_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_save_timestamp
    }

    pub fn last_save_failed(&self) -> bool {
        self.last_save_failed
    }

    pub fn should_exit_player(&self) -> bool {
        self.should_exit_player
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.question_answering_states.is_empty()
    }
}
