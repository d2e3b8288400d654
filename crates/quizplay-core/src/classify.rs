//! Per-question answer state derivation.
//!
//! Callers hand over whatever response they hold, in either wire encoding,
//! and get back one [`AnswerStatus`]. They never branch on the encoding
//! themselves.

use serde::{Deserialize, Serialize};

use crate::model::{LegacyState, Question, Response, Score};

/// Derived display state of one question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStatus {
    pub answered: bool,
    pub skipped: bool,
    pub scored: bool,
    pub correct: bool,
    pub incorrect: bool,
}

impl AnswerStatus {
    /// Hide correctness unless the question allows revealing it.
    pub fn revealed_for(self, question: &Question) -> Self {
        if question.display_detail.correct_answer {
            self
        } else {
            Self {
                correct: false,
                incorrect: false,
                ..self
            }
        }
    }

    /// Neither answered nor skipped.
    pub fn is_open(&self) -> bool {
        !self.answered && !self.skipped
    }
}

/// Which response encoding an attempt was recorded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseEncoding {
    #[default]
    Current,
    Legacy,
}

impl ResponseEncoding {
    pub fn from_legacy_flag(is_legacy: bool) -> Self {
        if is_legacy {
            ResponseEncoding::Legacy
        } else {
            ResponseEncoding::Current
        }
    }
}

/// Classify one question from its response and optional score.
///
/// Under the legacy encoding a response carrying a `state` is answered iff
/// that state is `SAVED`; a legacy-flagged response without a `state` falls
/// back to the current rule. A selection of the wrong kind for the question
/// counts as unanswered.
pub fn classify(
    question: &Question,
    response: Option<&Response>,
    score: Option<&Score>,
    encoding: ResponseEncoding,
) -> AnswerStatus {
    let selection = response.and_then(|r| r.selection.as_ref());
    let skipped = selection.is_some_and(|s| s.is_skip());

    let legacy_state = match encoding {
        ResponseEncoding::Legacy => response.and_then(|r| r.state),
        ResponseEncoding::Current => None,
    };

    let answered = !skipped
        && match legacy_state {
            Some(state) => state == LegacyState::Saved,
            None => selection.is_some_and(|s| !s.is_empty() && s.fits(question.kind)),
        };

    let scored = score.is_some_and(|s| !s.is_empty());
    let correct = scored && score.is_some_and(|s| s.points_possible == s.points_awarded);

    AnswerStatus {
        answered,
        skipped,
        scored,
        correct,
        incorrect: scored && !correct,
    }
}

/// Classify a response still in its raw JSON wire form.
///
/// `null` means no response. Anything that matches neither encoding is
/// treated as unanswered instead of failing.
pub fn classify_value(
    question: &Question,
    response: &serde_json::Value,
    score: Option<&Score>,
    encoding: ResponseEncoding,
) -> AnswerStatus {
    let parsed = if response.is_null() {
        None
    } else {
        match serde_json::from_value::<Response>(response.clone()) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::debug!(
                    "question {} has an unrecognised response shape, treating as unanswered: {e}",
                    question.index
                );
                None
            }
        }
    };
    classify(question, parsed.as_ref(), score, encoding)
}
