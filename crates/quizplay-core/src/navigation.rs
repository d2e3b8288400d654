//! Navigation policy evaluation.
//!
//! Pure functions only. [`can_go`] is the authoritative gate and must be
//! called fresh at the moment of a move; [`can_go_status`] is a derived view
//! for rendering affordances.

use crate::classify::AnswerStatus;
use crate::model::ScoreReleasePolicy;
use crate::policy::NavigationPolicy;

/// Can the learner move from `from` to `to` right now?
///
/// Moves to the current question or outside `[0, question_count)` are
/// always rejected.
pub fn can_go(
    from: usize,
    to: usize,
    from_state: &AnswerStatus,
    to_state: &AnswerStatus,
    question_count: usize,
    policy: &NavigationPolicy,
) -> bool {
    if matches!(policy, NavigationPolicy::Yolo) {
        tracing::warn!("yolo navigation policy bypasses answer checks ({from} -> {to})");
    }
    evaluate(from, to, from_state, to_state, question_count, policy)
}

fn evaluate(
    from: usize,
    to: usize,
    from_state: &AnswerStatus,
    to_state: &AnswerStatus,
    question_count: usize,
    policy: &NavigationPolicy,
) -> bool {
    if to >= question_count || to == from {
        return false;
    }

    match *policy {
        NavigationPolicy::Unrestricted => true,
        // Either side satisfies the gate, so an answered question can always
        // be revisited.
        NavigationPolicy::RequireAnswer => from_state.answered || to_state.answered,
        NavigationPolicy::EnforceLinear => to > from && from_state.answered,
        NavigationPolicy::Yolo => to > from,
        NavigationPolicy::Composable {
            backtracking_allowed,
            skipping_allowed,
        } => {
            if to == from + 1 && from_state.answered {
                true
            } else if to < from {
                backtracking_allowed
            } else {
                skipping_allowed
            }
        }
    }
}

/// Reachability of every question from `current`, for UI affordances.
///
/// With no current question nothing is reachable; re-entry goes through
/// [`initial_question_index`].
pub fn can_go_status(
    current: Option<usize>,
    states: &[AnswerStatus],
    policy: &NavigationPolicy,
) -> Vec<bool> {
    let Some(from) = current.filter(|&i| i < states.len()) else {
        return vec![false; states.len()];
    };

    if matches!(policy, NavigationPolicy::Yolo) {
        tracing::warn!("yolo navigation policy bypasses answer checks");
    }

    let from_state = &states[from];
    states
        .iter()
        .enumerate()
        .map(|(to, to_state)| evaluate(from, to, from_state, to_state, states.len(), policy))
        .collect()
}

/// Where the player goes after the learner leaves `current`.
///
/// Stays put when not skipping and scores are released on response, so the
/// learner can read the feedback. Returns `None` after the last question,
/// at which point the attempt can be exited.
pub fn index_to_go_after(
    current: usize,
    last_index: usize,
    release: ScoreReleasePolicy,
    is_skipping: bool,
) -> Option<usize> {
    if !is_skipping && release == ScoreReleasePolicy::OnResponse {
        return Some(current);
    }
    if current >= last_index {
        None
    } else {
        Some(current + 1)
    }
}

/// Resume position on re-entry: the first question neither answered nor
/// skipped, else the last question. `None` for an empty attempt.
pub fn initial_question_index(states: &[AnswerStatus]) -> Option<usize> {
    states
        .iter()
        .position(AnswerStatus::is_open)
        .or_else(|| states.len().checked_sub(1))
}

/// Whether to offer a skip control. Only policies with no other way past an
/// unanswered question need one.
pub fn should_display_skip(policy: &NavigationPolicy) -> bool {
    matches!(
        policy,
        NavigationPolicy::RequireAnswer | NavigationPolicy::EnforceLinear
    )
}
