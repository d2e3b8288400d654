//! Attempt session driver.
//!
//! Binds one attempt to its resolved policy, its player state and the
//! persistence and scoring collaborators. Every learner action goes through
//! the pure pieces ([`crate::navigation`], [`crate::classify`]) before it
//! becomes a [`PlayerEvent`]; collaborator results come back as events too.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, AnswerStatus, ResponseEncoding};
use crate::error::EngineError;
use crate::model::{Attempt, Response, Selection};
use crate::navigation::{
    can_go, can_go_status, index_to_go_after, initial_question_index, should_display_skip,
};
use crate::player::{AttemptPlayerState, PlayerEvent};
use crate::policy::NavigationPolicy;
use crate::report::AttemptReport;
use crate::traits::{PersistenceService, SaveAllRequest, SaveRequest, ScoringService};

/// One scripted learner action, as found in replay files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayStep {
    Answer { selection: Selection },
    Clear,
    Skip,
    Next,
    Previous,
    GoTo { question: usize },
    Save,
    Submit,
    Exit,
}

/// What happened when a [`ReplayStep`] ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    /// Navigation refused by the policy; state unchanged.
    Blocked,
    /// Nothing to act on (no current question, nothing pending).
    Ignored,
    Saved { count: usize },
    SaveFailed { failed: Vec<usize> },
    Finished,
}

/// Where a "next" action left the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved(usize),
    /// Kept on the question so released feedback can be read.
    Stayed(usize),
    /// Past the last question; the attempt can be exited.
    Finished,
    Blocked,
    /// No current question.
    Ignored,
}

/// Result of flushing the edit buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub saved: Vec<usize>,
    pub failed: Vec<usize>,
}

impl SaveOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AttemptSession {
    attempt: Attempt,
    policy: NavigationPolicy,
    encoding: ResponseEncoding,
    player: AttemptPlayerState,
    persistence: Arc<dyn PersistenceService>,
    scoring: Arc<dyn ScoringService>,
    /// Question whose saved response has feedback the learner has not yet
    /// been held on. Cleared by any navigation or new edit.
    feedback_due: Option<usize>,
}

impl AttemptSession {
    /// Resolve the attempt's policy and build an idle session.
    pub fn new(
        attempt: Attempt,
        persistence: Arc<dyn PersistenceService>,
        scoring: Arc<dyn ScoringService>,
    ) -> Result<Self, EngineError> {
        let policy = NavigationPolicy::resolve(&attempt.settings)?;
        let encoding = ResponseEncoding::from_legacy_flag(attempt.settings.legacy_encoding);
        Ok(Self {
            attempt,
            policy,
            encoding,
            player: AttemptPlayerState::new(),
            persistence,
            scoring,
            feedback_due: None,
        })
    }

    /// Enter the player at the resume position.
    pub fn open(&mut self) -> Option<usize> {
        let target = initial_question_index(&self.statuses());
        self.dispatch(PlayerEvent::NavigatedTo {
            target,
            reset_index: None,
        });
        tracing::info!(
            attempt = %self.attempt.id,
            policy = %self.policy,
            "opened attempt at question {target:?}"
        );
        target
    }

    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    pub fn policy(&self) -> &NavigationPolicy {
        &self.policy
    }

    pub fn player(&self) -> &AttemptPlayerState {
        &self.player
    }

    pub fn current_question(&self) -> Option<usize> {
        self.player.current_question_index()
    }

    /// The response the learner currently sees: the unsaved edit if there is
    /// one, else the committed response.
    pub fn effective_response(&self, index: usize) -> Option<&Response> {
        match self.player.question_answering_states().get(index) {
            Some(edit) => edit.as_ref(),
            None => self.attempt.responses.get(&index),
        }
    }

    pub fn status(&self, index: usize) -> AnswerStatus {
        match self.attempt.questions.get(index) {
            Some(question) => classify(
                question,
                self.effective_response(index),
                self.attempt.scores.get(&index),
                self.encoding,
            ),
            None => AnswerStatus::default(),
        }
    }

    pub fn statuses(&self) -> Vec<AnswerStatus> {
        (0..self.attempt.question_count())
            .map(|i| self.status(i))
            .collect()
    }

    /// Statuses with correctness hidden where the question forbids it.
    pub fn learner_statuses(&self) -> Vec<AnswerStatus> {
        self.attempt
            .questions
            .iter()
            .zip(self.statuses())
            .map(|(q, s)| s.revealed_for(q))
            .collect()
    }

    pub fn can_go_status(&self) -> Vec<bool> {
        can_go_status(self.current_question(), &self.statuses(), &self.policy)
    }

    pub fn should_display_skip(&self) -> bool {
        should_display_skip(&self.policy)
    }

    /// Record an edit for the current question. Ignored with no question.
    pub fn answer(&mut self, response: Option<Response>) -> bool {
        let question_index = self.current_question();
        self.feedback_due = None;
        self.dispatch(PlayerEvent::AnswerChanged {
            question_index,
            response,
        });
        question_index.is_some()
    }

    /// Move to `target` if the policy allows it right now.
    pub fn go_to(&mut self, target: usize) -> bool {
        let Some(from) = self.current_question() else {
            return false;
        };
        if !can_go(
            from,
            target,
            &self.status(from),
            &self.status(target),
            self.attempt.question_count(),
            &self.policy,
        ) {
            tracing::debug!("navigation {from} -> {target} refused by {}", self.policy);
            return false;
        }
        self.dispatch(PlayerEvent::NavigatedTo {
            target: Some(target),
            reset_index: None,
        });
        true
    }

    /// Leave the current question forwards, the way a "next" control does.
    ///
    /// Under [`ScoreReleasePolicy::OnResponse`] the first "next" after a
    /// save holds the learner on the question to read the released feedback;
    /// the following one moves on.
    ///
    /// [`ScoreReleasePolicy::OnResponse`]: crate::model::ScoreReleasePolicy::OnResponse
    pub fn advance(&mut self) -> Advance {
        let (Some(current), Some(last)) = (self.current_question(), self.attempt.last_index())
        else {
            return Advance::Ignored;
        };
        let hold = self.feedback_due.take() == Some(current);
        match index_to_go_after(current, last, self.attempt.settings.score_release, !hold) {
            Some(next) if next == current => Advance::Stayed(current),
            Some(next) if self.go_to(next) => Advance::Moved(next),
            Some(_) => Advance::Blocked,
            None => {
                // Gated policies still need an answer (or a skip) to finish.
                if !self.status(current).answered && should_display_skip(&self.policy) {
                    return Advance::Blocked;
                }
                self.dispatch(PlayerEvent::NavigatedTo {
                    target: None,
                    reset_index: None,
                });
                Advance::Finished
            }
        }
    }

    /// Move back one question if the policy allows it.
    pub fn retreat(&mut self) -> bool {
        match self.current_question() {
            Some(current) if current > 0 => self.go_to(current - 1),
            _ => false,
        }
    }

    /// Explicitly skip the current question.
    ///
    /// The skip marker is committed straight to persistence, any unsaved edit
    /// for the question is abandoned, and the player moves on. Only offered
    /// when the policy shows a skip control or would allow the move anyway.
    pub async fn skip(&mut self) -> anyhow::Result<StepOutcome> {
        let Some(current) = self.current_question() else {
            return Ok(StepOutcome::Ignored);
        };
        let Some(last) = self.attempt.last_index() else {
            return Ok(StepOutcome::Ignored);
        };
        let next = index_to_go_after(current, last, self.attempt.settings.score_release, true);

        let permitted = should_display_skip(&self.policy)
            || next.map_or(true, |n| {
                can_go(
                    current,
                    n,
                    &self.status(current),
                    &self.status(n),
                    self.attempt.question_count(),
                    &self.policy,
                )
            });
        if !permitted {
            return Ok(StepOutcome::Blocked);
        }

        let request = SaveRequest {
            attempt_id: self.attempt.id,
            question_index: current,
            response: Some(Response::skip()),
        };
        if let Err(e) = self.persistence.save_response(&request).await {
            log_save_error(current, &e);
            self.dispatch(PlayerEvent::SaveFailed);
            return Ok(StepOutcome::SaveFailed {
                failed: vec![current],
            });
        }

        self.attempt.responses.insert(current, Response::skip());
        self.attempt.scores.remove(&current);
        self.dispatch(PlayerEvent::NavigatedTo {
            target: next,
            reset_index: Some(current),
        });
        Ok(match next {
            Some(_) => StepOutcome::Applied,
            None => StepOutcome::Finished,
        })
    }

    /// Save the current question's edit, if it has one.
    pub async fn save_current(&mut self) -> SaveOutcome {
        match self.current_question() {
            Some(index) if self.player.question_answering_states().contains(index) => {
                self.save_indices(vec![index]).await
            }
            _ => SaveOutcome::default(),
        }
    }

    /// Save every pending edit concurrently, folding each result into the
    /// player state in the order the saves resolve.
    pub async fn save_pending(&mut self) -> SaveOutcome {
        let indices: Vec<usize> = self.player.question_answering_states().indices().collect();
        self.save_indices(indices).await
    }

    async fn save_indices(&mut self, indices: Vec<usize>) -> SaveOutcome {
        let mut outcome = SaveOutcome::default();
        let mut in_flight = FuturesUnordered::new();

        for index in indices {
            let Some(edit) = self.player.question_answering_states().get(index) else {
                continue;
            };
            let request = SaveRequest {
                attempt_id: self.attempt.id,
                question_index: index,
                response: edit.clone(),
            };
            let persistence = Arc::clone(&self.persistence);
            in_flight.push(async move {
                let result = persistence.save_response(&request).await;
                (request, result)
            });
        }

        while let Some((request, result)) = in_flight.next().await {
            let index = request.question_index;
            match result {
                Ok(()) => {
                    self.commit(index, request.response);
                    self.dispatch(PlayerEvent::QuestionSaved {
                        question_index: index,
                    });
                    outcome.saved.push(index);
                }
                Err(e) => {
                    log_save_error(index, &e);
                    self.dispatch(PlayerEvent::SaveFailed);
                    outcome.failed.push(index);
                }
            }
        }

        for &index in &outcome.saved {
            self.rescore(index).await;
        }
        if let Some(current) = self.current_question() {
            if outcome.saved.contains(&current) {
                self.feedback_due = Some(current);
            }
        }
        outcome
    }

    /// Bulk-save every question's effective response.
    pub async fn submit(&mut self) -> bool {
        let responses: BTreeMap<usize, Option<Response>> = (0..self.attempt.question_count())
            .map(|i| (i, self.effective_response(i).cloned()))
            .collect();
        let pending: Vec<usize> = self.player.question_answering_states().indices().collect();
        let request = SaveAllRequest {
            attempt_id: self.attempt.id,
            responses,
        };

        if let Err(e) = self.persistence.save_all(&request).await {
            tracing::warn!(attempt = %self.attempt.id, "submit failed, edits kept: {e:#}");
            self.dispatch(PlayerEvent::SaveFailed);
            return false;
        }

        for index in &pending {
            let response = request.responses.get(index).cloned().flatten();
            self.commit(*index, response);
        }
        self.dispatch(PlayerEvent::AllQuestionsSaved);
        for index in pending {
            self.rescore(index).await;
        }
        self.feedback_due = self.current_question();
        tracing::info!(attempt = %self.attempt.id, "attempt submitted");
        true
    }

    pub fn request_exit(&mut self) {
        self.dispatch(PlayerEvent::ExitRequested);
    }

    pub fn acknowledge_exit(&mut self) {
        self.dispatch(PlayerEvent::ExitAcknowledged);
    }

    /// Run one scripted step.
    pub async fn run_step(&mut self, step: &ReplayStep) -> anyhow::Result<StepOutcome> {
        let outcome = match step {
            ReplayStep::Answer { selection } => {
                if self.answer(Some(Response::selected(selection.clone()))) {
                    StepOutcome::Applied
                } else {
                    StepOutcome::Ignored
                }
            }
            ReplayStep::Clear => {
                if self.answer(None) {
                    StepOutcome::Applied
                } else {
                    StepOutcome::Ignored
                }
            }
            ReplayStep::Skip => self.skip().await?,
            ReplayStep::Next => match self.advance() {
                Advance::Moved(_) | Advance::Stayed(_) => StepOutcome::Applied,
                Advance::Finished => StepOutcome::Finished,
                Advance::Blocked => StepOutcome::Blocked,
                Advance::Ignored => StepOutcome::Ignored,
            },
            ReplayStep::Previous => {
                if self.retreat() {
                    StepOutcome::Applied
                } else {
                    StepOutcome::Blocked
                }
            }
            ReplayStep::GoTo { question } => {
                if self.go_to(*question) {
                    StepOutcome::Applied
                } else {
                    StepOutcome::Blocked
                }
            }
            ReplayStep::Save => {
                let saved = self.save_pending().await;
                if !saved.is_clean() {
                    StepOutcome::SaveFailed {
                        failed: saved.failed,
                    }
                } else if saved.saved.is_empty() {
                    StepOutcome::Ignored
                } else {
                    StepOutcome::Saved {
                        count: saved.saved.len(),
                    }
                }
            }
            ReplayStep::Submit => {
                if self.submit().await {
                    StepOutcome::Saved {
                        count: self.attempt.question_count(),
                    }
                } else {
                    StepOutcome::SaveFailed {
                        failed: self.player.question_answering_states().indices().collect(),
                    }
                }
            }
            ReplayStep::Exit => {
                self.request_exit();
                StepOutcome::Finished
            }
        };
        Ok(outcome)
    }

    pub fn report(&self) -> AttemptReport {
        AttemptReport::from_session(self)
    }

    fn dispatch(&mut self, event: PlayerEvent) {
        if matches!(event, PlayerEvent::NavigatedTo { .. }) {
            self.feedback_due = None;
        }
        self.player.apply(event, Utc::now());
    }

    /// The persistence layer is now the source of truth for `index`.
    fn commit(&mut self, index: usize, response: Option<Response>) {
        match response {
            Some(r) => {
                self.attempt.responses.insert(index, r);
            }
            None => {
                self.attempt.responses.remove(&index);
            }
        }
        self.attempt.scores.remove(&index);
    }

    async fn rescore(&mut self, index: usize) {
        let Some(question) = self.attempt.questions.get(index) else {
            return;
        };
        let response = self.attempt.responses.get(&index);
        match self.scoring.score(question, response).await {
            Ok(Some(score)) => {
                self.attempt.scores.insert(index, score);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("scoring failed for question {index}, left unscored: {e:#}");
            }
        }
    }
}

fn log_save_error(index: usize, error: &anyhow::Error) {
    match error.downcast_ref::<EngineError>() {
        Some(e) if e.is_transient() => {
            tracing::warn!("save for question {index} failed, edit kept for retry: {e}");
        }
        _ => tracing::error!("save for question {index} failed: {error:#}"),
    }
}
