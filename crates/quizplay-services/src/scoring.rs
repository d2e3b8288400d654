//! Answer-key scoring.
//!
//! Scores a committed response against the question's `answer_key`. Essays
//! and file uploads are left for manual grading.

use std::collections::HashSet;

use async_trait::async_trait;

use quizplay_core::error::EngineError;
use quizplay_core::model::{Question, Response, Score, Selection};
use quizplay_core::traits::ScoringService;

/// Relative tolerance for numeric answers.
const NUMERIC_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerKeyScorer;

impl AnswerKeyScorer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScoringService for AnswerKeyScorer {
    async fn score(
        &self,
        question: &Question,
        response: Option<&Response>,
    ) -> anyhow::Result<Option<Score>> {
        let Some(key) = &question.answer_key else {
            return Ok(None);
        };
        if !key.fits(question.kind) || key.is_skip() {
            return Err(EngineError::Scoring(format!(
                "answer key for question {} is not a {} answer",
                question.index, question.kind
            ))
            .into());
        }

        let Some(selection) = response
            .and_then(|r| r.selection.as_ref())
            .filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };

        let Some(fraction) = credit(key, selection) else {
            return Ok(None);
        };
        let awarded = question.points * fraction;
        tracing::debug!(
            "question {} scored {awarded}/{}",
            question.index,
            question.points
        );
        Ok(Some(Score::new(question.points, awarded)))
    }
}

/// Fraction of the points earned, or `None` when the kind needs a human.
fn credit(key: &Selection, answer: &Selection) -> Option<f64> {
    let full = |ok: bool| if ok { 1.0 } else { 0.0 };
    match (key, answer) {
        (Selection::Essay { .. }, _) | (Selection::FileUpload { .. }, _) => None,
        (
            Selection::MultipleChoice { choice: Some(k) },
            Selection::MultipleChoice { choice: Some(a) },
        ) => Some(full(normalize(k) == normalize(a))),
        (Selection::MultipleAnswer { choices: k }, Selection::MultipleAnswer { choices: a }) => {
            let k: HashSet<String> = k.iter().map(|c| normalize(c)).collect();
            let a: HashSet<String> = a.iter().map(|c| normalize(c)).collect();
            Some(full(k == a))
        }
        (Selection::TrueFalse { value: k }, Selection::TrueFalse { value: a }) => {
            Some(full(k == a))
        }
        (Selection::ShortAnswer { text: k }, Selection::ShortAnswer { text: a }) => {
            Some(full(normalize(k) == normalize(a)))
        }
        (Selection::Numeric { value: Some(k) }, Selection::Numeric { value: Some(a) }) => {
            Some(full((k - a).abs() <= NUMERIC_TOLERANCE * k.abs().max(1.0)))
        }
        (Selection::Matching { pairs: k }, Selection::Matching { pairs: a }) => {
            if k.is_empty() {
                return Some(0.0);
            }
            let matched = k
                .iter()
                .filter(|(left, right)| {
                    a.get(*left)
                        .is_some_and(|ans| normalize(ans) == normalize(right))
                })
                .count();
            Some(matched as f64 / k.len() as f64)
        }
        (Selection::Ordering { order: k }, Selection::Ordering { order: a }) => {
            Some(full(k.len() == a.len()
                && k.iter().zip(a).all(|(x, y)| normalize(x) == normalize(y))))
        }
        // An answer of the wrong kind earns nothing.
        _ => Some(0.0),
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
