//! Attempt session integration tests.
//!
//! Drive `AttemptSession` end to end against in-test collaborators that can
//! fail, delay, and record what they were asked to do.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use quizplay_core::error::EngineError;
use quizplay_core::model::{
    Attempt, AttemptSettings, ComposableSettings, LegacyState, Question, QuestionKind, Response,
    Score, ScoreReleasePolicy, Selection,
};
use quizplay_core::navigation::can_go;
use quizplay_core::policy::NavigationPolicy;
use quizplay_core::report::AttemptReport;
use quizplay_core::session::{Advance, AttemptSession, ReplayStep, StepOutcome};
use quizplay_core::traits::{PersistenceService, SaveAllRequest, SaveRequest, ScoringService};

#[derive(Default)]
struct FlakyStore {
    fail: AtomicBool,
    fail_indices: Mutex<HashSet<usize>>,
    /// Per-index artificial latency, to force out-of-order completion.
    delays_ms: Mutex<BTreeMap<usize, u64>>,
    completed: Mutex<Vec<usize>>,
    bulk_saves: AtomicU32,
}

#[async_trait]
impl PersistenceService for FlakyStore {
    async fn save_response(&self, request: &SaveRequest) -> anyhow::Result<()> {
        let delay = self
            .delays_ms
            .lock()
            .unwrap()
            .get(&request.question_index)
            .copied();
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if self.fail.load(Ordering::Relaxed)
            || self
                .fail_indices
                .lock()
                .unwrap()
                .contains(&request.question_index)
        {
            return Err(EngineError::SaveFailed {
                index: request.question_index,
                reason: "store offline".into(),
            }
            .into());
        }
        self.completed.lock().unwrap().push(request.question_index);
        Ok(())
    }

    async fn save_all(&self, _request: &SaveAllRequest) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(EngineError::Persistence("store offline".into()).into());
        }
        self.bulk_saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Full marks for any non-empty, non-skip selection.
struct GenerousScorer;

#[async_trait]
impl ScoringService for GenerousScorer {
    async fn score(
        &self,
        question: &Question,
        response: Option<&Response>,
    ) -> anyhow::Result<Option<Score>> {
        Ok(response
            .and_then(|r| r.selection.as_ref())
            .filter(|s| !s.is_empty())
            .map(|_| Score::new(question.points, question.points)))
    }
}

fn attempt(kinds: &[QuestionKind], settings: AttemptSettings) -> Attempt {
    Attempt {
        id: Uuid::new_v4(),
        title: "test".into(),
        questions: kinds
            .iter()
            .enumerate()
            .map(|(i, k)| Question::new(i, *k))
            .collect(),
        responses: BTreeMap::new(),
        scores: BTreeMap::new(),
        settings,
    }
}

fn policy(name: &str) -> AttemptSettings {
    AttemptSettings {
        assessment_navigation_policy: Some(name.into()),
        ..Default::default()
    }
}

fn text(t: &str) -> Option<Response> {
    Some(Response::selected(Selection::ShortAnswer { text: t.into() }))
}

fn session(attempt: Attempt, store: &Arc<FlakyStore>) -> AttemptSession {
    AttemptSession::new(attempt, store.clone(), Arc::new(GenerousScorer)).unwrap()
}

const THREE_TEXT: [QuestionKind; 3] = [QuestionKind::ShortAnswer; 3];

#[tokio::test]
async fn linear_attempt_blocks_backtracking() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, policy("enforce_linear")), &store);
    assert_eq!(s.open(), Some(0));
    assert!(s.should_display_skip());

    // Unanswered: cannot move on.
    assert!(!s.go_to(1));
    assert_eq!(s.advance(), Advance::Blocked);

    s.answer(text("first"));
    let statuses = s.statuses();
    assert!(can_go(0, 1, &statuses[0], &statuses[1], 3, s.policy()));
    assert!(s.go_to(1));
    assert_eq!(s.current_question(), Some(1));

    // Backtracking refused whatever Q1's state is.
    assert!(!s.go_to(0));
    s.answer(text("second"));
    assert!(!s.go_to(0));
    assert_eq!(s.current_question(), Some(1));
}

#[tokio::test]
async fn require_answer_allows_return_to_answered_question() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, policy("require_answer")), &store);
    s.open();
    s.answer(text("done"));
    assert!(s.go_to(2));
    // Q2 is unanswered but Q0 is answered, so the OR gate lets us back.
    assert!(s.go_to(0));
    assert_eq!(s.can_go_status(), vec![false, true, true]);
}

#[tokio::test]
async fn save_failure_keeps_edit_until_retry_succeeds() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, AttemptSettings::default()), &store);
    s.open();
    s.answer(text("keep me"));

    store.fail.store(true, Ordering::Relaxed);
    let outcome = s.save_current().await;
    assert_eq!(outcome.failed, vec![0]);
    assert!(s.player().last_save_failed());
    assert_eq!(
        s.player().question_answering_states().get(0),
        Some(&text("keep me"))
    );
    assert!(s.attempt().responses.is_empty());

    store.fail.store(false, Ordering::Relaxed);
    let outcome = s.save_pending().await;
    assert_eq!(outcome.saved, vec![0]);
    assert!(!s.player().last_save_failed());
    assert!(!s.player().has_unsaved_changes());
    assert_eq!(s.attempt().responses.get(&0), text("keep me").as_ref());
    assert_eq!(s.attempt().scores.get(&0), Some(&Score::new(1.0, 1.0)));
    assert!(s.status(0).correct);
}

#[tokio::test(start_paused = true)]
async fn concurrent_saves_fold_in_arrival_order() {
    let store = Arc::new(FlakyStore::default());
    {
        let mut delays = store.delays_ms.lock().unwrap();
        delays.insert(0, 300);
        delays.insert(1, 200);
        delays.insert(2, 100);
    }
    store.fail_indices.lock().unwrap().insert(1);

    let mut s = session(attempt(&THREE_TEXT, AttemptSettings::default()), &store);
    s.open();
    for i in 0..3 {
        assert!(s.go_to(i) || s.current_question() == Some(i));
        s.answer(text(&format!("answer {i}")));
    }

    let outcome = s.save_pending().await;
    assert_eq!(outcome.saved, vec![2, 0]);
    assert_eq!(outcome.failed, vec![1]);
    assert_eq!(*store.completed.lock().unwrap(), vec![2, 0]);

    // Q0 succeeded last, which clears the failure flag; Q1's edit survives.
    assert!(!s.player().last_save_failed());
    let pending: Vec<usize> = s.player().question_answering_states().indices().collect();
    assert_eq!(pending, vec![1]);
}

#[tokio::test]
async fn submit_commits_everything() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, AttemptSettings::default()), &store);
    s.open();
    s.answer(text("a"));
    s.go_to(2);
    s.answer(text("c"));

    assert!(s.submit().await);
    assert_eq!(store.bulk_saves.load(Ordering::Relaxed), 1);
    assert!(!s.player().has_unsaved_changes());
    assert!(s.player().last_save_timestamp().is_some());
    assert_eq!(s.attempt().responses.len(), 2);
    assert_eq!(s.attempt().scores.len(), 2);
}

#[tokio::test]
async fn failed_submit_keeps_buffer() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, AttemptSettings::default()), &store);
    s.open();
    s.answer(text("a"));
    store.fail.store(true, Ordering::Relaxed);

    assert!(!s.submit().await);
    assert!(s.player().last_save_failed());
    assert_eq!(s.player().question_answering_states().len(), 1);
}

#[tokio::test]
async fn skip_commits_marker_and_moves_on() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, policy("enforce_linear")), &store);
    s.open();
    s.answer(text("abandoned draft"));

    assert_eq!(s.skip().await.unwrap(), StepOutcome::Applied);
    assert_eq!(s.current_question(), Some(1));
    assert!(!s.player().question_answering_states().contains(0));
    assert!(s.status(0).skipped);
    assert!(!s.status(0).answered);

    // Re-entry resumes at the first question that is neither answered nor skipped.
    let mut reopened = session(s.attempt().clone(), &store);
    assert_eq!(reopened.open(), Some(1));
}

#[tokio::test]
async fn skip_blocked_when_policy_forbids_it() {
    let store = Arc::new(FlakyStore::default());
    let settings = AttemptSettings {
        navigation_policy: Some(ComposableSettings {
            backtracking_allowed: true,
            skipping_allowed: false,
        }),
        ..Default::default()
    };
    let mut s = session(attempt(&THREE_TEXT, settings), &store);
    s.open();
    assert_eq!(s.skip().await.unwrap(), StepOutcome::Blocked);
    assert_eq!(s.current_question(), Some(0));
}

#[tokio::test]
async fn release_on_response_stays_for_feedback() {
    let store = Arc::new(FlakyStore::default());
    let settings = AttemptSettings {
        score_release: ScoreReleasePolicy::OnResponse,
        ..Default::default()
    };
    let mut s = session(attempt(&THREE_TEXT[..2], settings), &store);
    s.open();

    // Nothing released yet: "next" moves straight on.
    s.answer(text("x"));
    assert_eq!(s.advance(), Advance::Moved(1));
    assert!(s.go_to(0));

    // First "next" after a save holds for feedback, the second moves on.
    s.save_pending().await;
    assert!(s.status(0).scored);
    assert_eq!(s.advance(), Advance::Stayed(0));
    assert_eq!(s.advance(), Advance::Moved(1));

    // Same on the last question, where moving on finishes the attempt.
    s.answer(text("y"));
    s.save_current().await;
    assert_eq!(s.advance(), Advance::Stayed(1));
    assert_eq!(s.advance(), Advance::Finished);
    assert_eq!(s.current_question(), None);
}

#[tokio::test]
async fn new_edit_after_save_drops_feedback_hold() {
    let store = Arc::new(FlakyStore::default());
    let settings = AttemptSettings {
        score_release: ScoreReleasePolicy::OnResponse,
        ..Default::default()
    };
    let mut s = session(attempt(&THREE_TEXT, settings), &store);
    s.open();
    s.answer(text("first"));
    s.save_current().await;
    s.answer(text("second"));
    assert_eq!(s.advance(), Advance::Moved(1));

    // A failed save releases nothing, so there is nothing to hold for.
    store.fail.store(true, Ordering::Relaxed);
    s.answer(text("third"));
    assert!(!s.save_current().await.is_clean());
    assert_eq!(s.advance(), Advance::Moved(2));
}

#[tokio::test]
async fn advancing_past_last_question_finishes() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(
        attempt(&[QuestionKind::TrueFalse], AttemptSettings::default()),
        &store,
    );
    s.open();
    assert_eq!(s.advance(), Advance::Finished);
    assert_eq!(s.current_question(), None);
    assert_eq!(s.advance(), Advance::Ignored);
    assert!(!s.answer(text("too late")));

    s.request_exit();
    assert!(s.player().should_exit_player());
    s.acknowledge_exit();
    assert!(!s.player().should_exit_player());
}

#[tokio::test]
async fn legacy_attempt_resumes_after_saved_questions() {
    let store = Arc::new(FlakyStore::default());
    let mut a = attempt(
        &[QuestionKind::Essay, QuestionKind::Essay, QuestionKind::Numeric],
        AttemptSettings {
            legacy_encoding: true,
            ..Default::default()
        },
    );
    a.responses.insert(0, Response::legacy(LegacyState::Saved));
    a.responses.insert(1, Response::legacy(LegacyState::Unsaved));
    let mut s = session(a, &store);
    assert_eq!(s.open(), Some(1));
    assert!(s.status(0).answered);
}

#[tokio::test]
async fn unknown_policy_is_rejected() {
    let store = Arc::new(FlakyStore::default());
    let result = AttemptSession::new(
        attempt(&THREE_TEXT, policy("teleport")),
        store,
        Arc::new(GenerousScorer),
    );
    assert!(matches!(result, Err(EngineError::UnknownPolicy(_))));
}

#[tokio::test]
async fn replay_steps_and_report() {
    let store = Arc::new(FlakyStore::default());
    let mut s = session(attempt(&THREE_TEXT, policy("yolo")), &store);
    s.open();
    assert_eq!(*s.policy(), NavigationPolicy::Yolo);

    let steps = [
        ReplayStep::Answer {
            selection: Selection::ShortAnswer { text: "one".into() },
        },
        ReplayStep::Next,
        ReplayStep::Previous,
        ReplayStep::Save,
        ReplayStep::Save,
    ];
    let mut outcomes = Vec::new();
    for step in &steps {
        outcomes.push(s.run_step(step).await.unwrap());
    }
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Applied,
            StepOutcome::Applied,
            StepOutcome::Blocked,
            StepOutcome::Saved { count: 1 },
            StepOutcome::Ignored,
        ]
    );

    let report = s.report();
    assert_eq!(report.summary.total, 3);
    assert_eq!(report.summary.answered, 1);
    assert_eq!(report.summary.scored, 1);
    // Correctness is hidden unless the question reveals it.
    assert_eq!(report.summary.correct, 0);
    assert_eq!(report.current_question, Some(1));
    assert_eq!(report.policy, "yolo");
    assert_eq!(
        report.questions.iter().map(|q| q.reachable).collect::<Vec<_>>(),
        vec![false, false, true]
    );

    // Scored, but the awarded points would give the answer away.
    assert_eq!(
        report.questions[0].score,
        Some(Score {
            points_possible: Some(1.0),
            points_awarded: None,
        })
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports/attempt.json");
    report.save_json(&path).unwrap();
    let loaded = AttemptReport::load_json(&path).unwrap();
    assert_eq!(loaded.attempt_id, report.attempt_id);
    assert_eq!(loaded.summary, report.summary);
}

#[tokio::test]
async fn report_shows_points_for_revealed_questions() {
    let store = Arc::new(FlakyStore::default());
    let mut a = attempt(&THREE_TEXT[..2], AttemptSettings::default());
    a.questions[1].display_detail.correct_answer = true;
    let mut s = session(a, &store);
    s.open();

    s.answer(text("hidden"));
    assert!(s.go_to(1));
    s.answer(text("shown"));
    assert_eq!(s.save_pending().await.saved.len(), 2);

    let report = s.report();
    assert_eq!(report.questions[0].score.as_ref().unwrap().points_awarded, None);
    assert_eq!(report.questions[1].score, Some(Score::new(1.0, 1.0)));
    assert!(report.questions[1].status.correct);
    assert_eq!(report.summary.correct, 1);
}
