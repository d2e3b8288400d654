//! Core data model types for quizplay.
//!
//! These are the in-process contracts the engine works with: questions,
//! learner responses in both wire encodings, externally supplied scores and
//! the raw attempt settings that policies are resolved from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of question kinds an attempt may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    MultipleAnswer,
    TrueFalse,
    ShortAnswer,
    Essay,
    Numeric,
    Matching,
    Ordering,
    FileUpload,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::MultipleAnswer => "multiple_answer",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::Essay => "essay",
            QuestionKind::Numeric => "numeric",
            QuestionKind::Matching => "matching",
            QuestionKind::Ordering => "ordering",
            QuestionKind::FileUpload => "file_upload",
        };
        f.write_str(name)
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "multiple_choice" | "choice" => Ok(QuestionKind::MultipleChoice),
            "multiple_answer" | "multi" => Ok(QuestionKind::MultipleAnswer),
            "true_false" | "boolean" => Ok(QuestionKind::TrueFalse),
            "short_answer" | "text" => Ok(QuestionKind::ShortAnswer),
            "essay" => Ok(QuestionKind::Essay),
            "numeric" | "number" => Ok(QuestionKind::Numeric),
            "matching" => Ok(QuestionKind::Matching),
            "ordering" => Ok(QuestionKind::Ordering),
            "file_upload" | "upload" => Ok(QuestionKind::FileUpload),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// What the learner may be shown about a question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDetail {
    /// Whether correctness may be revealed to the learner.
    #[serde(default)]
    pub correct_answer: bool,
}

/// An immutable question descriptor, owned by its attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// 0-based position in the attempt.
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub display_detail: DisplayDetail,
    /// Points available; only read by scoring collaborators.
    #[serde(default = "default_points")]
    pub points: f64,
    /// Expected selection; only read by scoring collaborators.
    #[serde(default)]
    pub answer_key: Option<Selection>,
}

fn default_points() -> f64 {
    1.0
}

impl Question {
    pub fn new(index: usize, kind: QuestionKind) -> Self {
        Self {
            index,
            kind,
            prompt: String::new(),
            display_detail: DisplayDetail::default(),
            points: default_points(),
            answer_key: None,
        }
    }
}

/// A type-tagged selection payload. Every variant except `Skip` belongs
/// to exactly one [`QuestionKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    /// The learner explicitly skipped the question.
    Skip,
    MultipleChoice {
        #[serde(default)]
        choice: Option<String>,
    },
    MultipleAnswer {
        #[serde(default)]
        choices: Vec<String>,
    },
    TrueFalse {
        #[serde(default)]
        value: Option<bool>,
    },
    ShortAnswer {
        #[serde(default)]
        text: String,
    },
    Essay {
        #[serde(default)]
        text: String,
    },
    Numeric {
        #[serde(default)]
        value: Option<f64>,
    },
    Matching {
        #[serde(default)]
        pairs: BTreeMap<String, String>,
    },
    Ordering {
        #[serde(default)]
        order: Vec<String>,
    },
    FileUpload {
        #[serde(default)]
        file_ids: Vec<String>,
    },
}

impl Selection {
    pub fn is_skip(&self) -> bool {
        matches!(self, Selection::Skip)
    }

    /// Returns `true` if the payload carries no answer. A skip carries none.
    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Skip => true,
            Selection::MultipleChoice { choice } => {
                choice.as_deref().map_or(true, |c| c.trim().is_empty())
            }
            Selection::MultipleAnswer { choices } => choices.is_empty(),
            Selection::TrueFalse { value } => value.is_none(),
            Selection::ShortAnswer { text } | Selection::Essay { text } => text.trim().is_empty(),
            Selection::Numeric { value } => !value.is_some_and(f64::is_finite),
            Selection::Matching { pairs } => pairs.is_empty(),
            Selection::Ordering { order } => order.is_empty(),
            Selection::FileUpload { file_ids } => file_ids.is_empty(),
        }
    }

    /// The question kind this payload answers, or `None` for a skip.
    pub fn kind(&self) -> Option<QuestionKind> {
        match self {
            Selection::Skip => None,
            Selection::MultipleChoice { .. } => Some(QuestionKind::MultipleChoice),
            Selection::MultipleAnswer { .. } => Some(QuestionKind::MultipleAnswer),
            Selection::TrueFalse { .. } => Some(QuestionKind::TrueFalse),
            Selection::ShortAnswer { .. } => Some(QuestionKind::ShortAnswer),
            Selection::Essay { .. } => Some(QuestionKind::Essay),
            Selection::Numeric { .. } => Some(QuestionKind::Numeric),
            Selection::Matching { .. } => Some(QuestionKind::Matching),
            Selection::Ordering { .. } => Some(QuestionKind::Ordering),
            Selection::FileUpload { .. } => Some(QuestionKind::FileUpload),
        }
    }

    /// Whether this payload can answer a question of `kind`.
    pub fn fits(&self, kind: QuestionKind) -> bool {
        self.kind().map_or(true, |k| k == kind)
    }
}

/// Save state used by the legacy response encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegacyState {
    Unsaved,
    Saved,
}

/// The learner's payload for one question.
///
/// The current encoding only uses `selection`; the legacy encoding marks a
/// committed answer with `state = "SAVED"` and may omit `selection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LegacyState>,
}

impl Response {
    pub fn selected(selection: Selection) -> Self {
        Self {
            selection: Some(selection),
            state: None,
        }
    }

    pub fn skip() -> Self {
        Self::selected(Selection::Skip)
    }

    pub fn legacy(state: LegacyState) -> Self {
        Self {
            selection: None,
            state: Some(state),
        }
    }
}

/// An externally computed score for one question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub points_awarded: Option<f64>,
}

impl Score {
    pub fn new(points_possible: f64, points_awarded: f64) -> Self {
        Self {
            points_possible: Some(points_possible),
            points_awarded: Some(points_awarded),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points_possible.is_none() && self.points_awarded.is_none()
    }

    /// Drop the awarded points unless the question allows revealing
    /// correctness; the points available stay visible.
    pub fn revealed_for(&self, question: &Question) -> Self {
        if question.display_detail.correct_answer {
            self.clone()
        } else {
            Self {
                points_awarded: None,
                ..self.clone()
            }
        }
    }
}

/// When scores are released to the learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReleasePolicy {
    /// Feedback is shown as soon as a response is saved; the next "next"
    /// stays on the question once so the learner can read it.
    OnResponse,
    #[default]
    OnSubmit,
    Manual,
}

impl fmt::Display for ScoreReleasePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreReleasePolicy::OnResponse => write!(f, "on_response"),
            ScoreReleasePolicy::OnSubmit => write!(f, "on_submit"),
            ScoreReleasePolicy::Manual => write!(f, "manual"),
        }
    }
}

impl FromStr for ScoreReleasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "on_response" | "immediately" => Ok(ScoreReleasePolicy::OnResponse),
            "on_submit" => Ok(ScoreReleasePolicy::OnSubmit),
            "manual" | "manually" => Ok(ScoreReleasePolicy::Manual),
            other => Err(format!("unknown score release policy: {other}")),
        }
    }
}

/// The object-shaped navigation setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposableSettings {
    #[serde(default)]
    pub backtracking_allowed: bool,
    #[serde(default)]
    pub skipping_allowed: bool,
}

/// Raw attempt settings as delivered by the host application.
///
/// Normally exactly one of the two navigation fields is populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptSettings {
    #[serde(default)]
    pub assessment_navigation_policy: Option<String>,
    #[serde(default)]
    pub navigation_policy: Option<ComposableSettings>,
    #[serde(default)]
    pub score_release: ScoreReleasePolicy,
    /// Responses in this attempt use the legacy `state` encoding.
    #[serde(default)]
    pub legacy_encoding: bool,
    /// Informational only; the engine does not run a clock.
    #[serde(default)]
    pub max_duration_minutes: Option<u32>,
}

/// One learner's pass through an ordered set of questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub title: String,
    pub questions: Vec<Question>,
    /// Responses already committed to persistence, keyed by question index.
    #[serde(default)]
    pub responses: BTreeMap<usize, Response>,
    #[serde(default)]
    pub scores: BTreeMap<usize, Score>,
    #[serde(default)]
    pub settings: AttemptSettings,
}

impl Attempt {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    /// Index of the final question, or `None` for an empty attempt.
    pub fn last_index(&self) -> Option<usize> {
        self.questions.len().checked_sub(1)
    }
}
