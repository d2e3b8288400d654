//! TOML attempt file parser.
//!
//! Loads attempts (and optional replay scripts) from TOML files and
//! directories, and validates them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::{
    Attempt, AttemptSettings, ComposableSettings, DisplayDetail, LegacyState, Question,
    QuestionKind, Response, Score, ScoreReleasePolicy, Selection,
};
use crate::navigation::should_display_skip;
use crate::policy::NavigationPolicy;
use crate::session::ReplayStep;

/// An attempt plus the scripted steps that replay it.
#[derive(Debug, Clone)]
pub struct AttemptFile {
    pub attempt: Attempt,
    pub steps: Vec<ReplayStep>,
}

/// Intermediate TOML structure for parsing attempt files.
#[derive(Debug, Deserialize)]
struct TomlAttemptFile {
    attempt: TomlAttemptHeader,
    #[serde(default)]
    settings: TomlSettings,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
    #[serde(default)]
    responses: Vec<TomlResponse>,
    #[serde(default)]
    scores: Vec<TomlScore>,
    #[serde(default)]
    steps: Vec<ReplayStep>,
}

#[derive(Debug, Deserialize)]
struct TomlAttemptHeader {
    #[serde(default)]
    id: Option<Uuid>,
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSettings {
    #[serde(default)]
    assessment_navigation_policy: Option<String>,
    #[serde(default)]
    navigation_policy: Option<ComposableSettings>,
    #[serde(default)]
    score_release: Option<String>,
    #[serde(default)]
    legacy_encoding: bool,
    #[serde(default)]
    max_duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    kind: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    correct_answer: bool,
    #[serde(default = "default_points")]
    points: f64,
    #[serde(default)]
    answer_key: Option<Selection>,
}

fn default_points() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct TomlResponse {
    question: usize,
    #[serde(default)]
    selection: Option<Selection>,
    #[serde(default)]
    state: Option<LegacyState>,
}

#[derive(Debug, Deserialize)]
struct TomlScore {
    question: usize,
    #[serde(default)]
    points_possible: Option<f64>,
    #[serde(default)]
    points_awarded: Option<f64>,
}

/// Parse a single TOML file into an `AttemptFile`.
pub fn parse_attempt(path: &Path) -> Result<AttemptFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read attempt file: {}", path.display()))?;

    parse_attempt_str(&content, path)
}

/// Parse a TOML string into an `AttemptFile` (useful for testing).
pub fn parse_attempt_str(content: &str, source_path: &Path) -> Result<AttemptFile> {
    let parsed: TomlAttemptFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let score_release = parsed
        .settings
        .score_release
        .as_deref()
        .map(|s| s.parse::<ScoreReleasePolicy>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("{}", e))?
        .unwrap_or_default();

    let questions: Vec<Question> = parsed
        .questions
        .into_iter()
        .enumerate()
        .map(|(index, q)| {
            let kind: QuestionKind = q
                .kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!("question {index}: {e}"))?;
            Ok(Question {
                index,
                kind,
                prompt: q.prompt,
                display_detail: DisplayDetail {
                    correct_answer: q.correct_answer,
                },
                points: q.points,
                answer_key: q.answer_key,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let count = questions.len();
    let in_range = |index: usize| -> Result<usize> {
        if index < count {
            Ok(index)
        } else {
            Err(EngineError::QuestionOutOfRange { index, count }.into())
        }
    };

    let mut responses = BTreeMap::new();
    for r in parsed.responses {
        responses.insert(
            in_range(r.question)?,
            Response {
                selection: r.selection,
                state: r.state,
            },
        );
    }

    let mut scores = BTreeMap::new();
    for s in parsed.scores {
        scores.insert(
            in_range(s.question)?,
            Score {
                points_possible: s.points_possible,
                points_awarded: s.points_awarded,
            },
        );
    }

    for step in &parsed.steps {
        if let ReplayStep::GoTo { question } = step {
            in_range(*question).context("replay step targets a missing question")?;
        }
    }

    let settings = AttemptSettings {
        assessment_navigation_policy: parsed.settings.assessment_navigation_policy,
        navigation_policy: parsed.settings.navigation_policy,
        score_release,
        legacy_encoding: parsed.settings.legacy_encoding,
        max_duration_minutes: parsed.settings.max_duration_minutes,
    };

    // Reject unknown policy names at load time rather than at first move.
    NavigationPolicy::resolve(&settings)
        .with_context(|| format!("invalid settings in {}", source_path.display()))?;

    Ok(AttemptFile {
        attempt: Attempt {
            id: parsed.attempt.id.unwrap_or_else(Uuid::new_v4),
            title: parsed.attempt.title,
            questions,
            responses,
            scores,
            settings,
        },
        steps: parsed.steps,
    })
}

/// Recursively load all `.toml` attempt files from a directory.
pub fn load_attempt_directory(dir: &Path) -> Result<Vec<AttemptFile>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            files.extend(load_attempt_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_attempt(&path) {
                Ok(file) => files.push(file),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(files)
}

/// A warning from attempt validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question index (if applicable).
    pub question: Option<usize>,
    /// Warning message.
    pub message: String,
}

/// Validate an attempt for common issues.
pub fn validate_attempt(attempt: &Attempt) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let settings = &attempt.settings;

    if attempt.questions.is_empty() {
        warnings.push(ValidationWarning {
            question: None,
            message: "attempt has no questions".into(),
        });
    }

    if settings.assessment_navigation_policy.is_some() && settings.navigation_policy.is_some() {
        warnings.push(ValidationWarning {
            question: None,
            message: "both navigation policy shapes are set; the composable settings are ignored"
                .into(),
        });
    }

    match NavigationPolicy::resolve(settings) {
        Ok(NavigationPolicy::Yolo) => warnings.push(ValidationWarning {
            question: None,
            message: "yolo navigation is a legacy policy and skips answer checks".into(),
        }),
        Ok(policy) if should_display_skip(&policy) => warnings.push(ValidationWarning {
            question: None,
            message: format!("{policy} policy shows a skip control on every question"),
        }),
        Ok(_) => {}
        Err(e) => warnings.push(ValidationWarning {
            question: None,
            message: e.to_string(),
        }),
    }

    for (&index, response) in &attempt.responses {
        let Some(question) = attempt.questions.get(index) else {
            warnings.push(ValidationWarning {
                question: Some(index),
                message: "response refers to a question that does not exist".into(),
            });
            continue;
        };
        if let Some(selection) = &response.selection {
            if !selection.fits(question.kind) {
                warnings.push(ValidationWarning {
                    question: Some(index),
                    message: format!(
                        "response selection does not fit a {} question and will count as unanswered",
                        question.kind
                    ),
                });
            }
        }
        if response.state.is_some() && !settings.legacy_encoding {
            warnings.push(ValidationWarning {
                question: Some(index),
                message: "legacy response state is ignored unless legacy_encoding is set".into(),
            });
        }
    }

    let mut seen_prompts = HashSet::new();
    for q in &attempt.questions {
        if let Some(key) = &q.answer_key {
            if key.is_skip() || !key.fits(q.kind) {
                warnings.push(ValidationWarning {
                    question: Some(q.index),
                    message: format!("answer key does not fit a {} question", q.kind),
                });
            }
        }
        if !q.prompt.trim().is_empty() && !seen_prompts.insert(q.prompt.trim()) {
            warnings.push(ValidationWarning {
                question: Some(q.index),
                message: "duplicate question prompt".into(),
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[attempt]
id = "6f1c2f7e-8a38-4c2c-9a53-0f6a5d1a9b11"
title = "Unit 1 Check"

[settings]
assessment_navigation_policy = "enforce_linear"
score_release = "on_submit"

[[questions]]
kind = "multiple_choice"
prompt = "Pick b"
correct_answer = true
answer_key = { type = "multiple_choice", choice = "b" }

[[questions]]
kind = "true_false"
prompt = "The sky is blue"

[[questions]]
kind = "essay"
prompt = "Explain"
points = 5.0

[[responses]]
question = 0
selection = { type = "multiple_choice", choice = "b" }

[[scores]]
question = 0
points_possible = 1.0
points_awarded = 1.0

[[steps]]
action = "answer"
selection = { type = "true_false", value = true }

[[steps]]
action = "go_to"
question = 2

[[steps]]
action = "save"
"#;

    #[test]
    fn parse_valid_toml() {
        let file = parse_attempt_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let attempt = &file.attempt;
        assert_eq!(attempt.title, "Unit 1 Check");
        assert_eq!(attempt.questions.len(), 3);
        assert_eq!(attempt.questions[1].index, 1);
        assert_eq!(attempt.questions[1].kind, QuestionKind::TrueFalse);
        assert!(attempt.questions[0].display_detail.correct_answer);
        assert_eq!(attempt.questions[2].points, 5.0);
        assert_eq!(attempt.responses.len(), 1);
        assert_eq!(attempt.scores[&0], Score::new(1.0, 1.0));
        assert_eq!(
            attempt.settings.assessment_navigation_policy.as_deref(),
            Some("enforce_linear")
        );
        assert_eq!(file.steps.len(), 3);
        assert_eq!(file.steps[1], ReplayStep::GoTo { question: 2 });
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[attempt]
title = "Minimal"

[[questions]]
kind = "short_answer"
"#;
        let file = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(file.attempt.settings.score_release, ScoreReleasePolicy::OnSubmit);
        assert!(!file.attempt.settings.legacy_encoding);
        assert_eq!(file.attempt.questions[0].points, 1.0);
        assert!(file.steps.is_empty());
        assert!(file.attempt.responses.is_empty());
    }

    #[test]
    fn parse_composable_and_legacy() {
        let toml = r#"
[attempt]
title = "Legacy"

[settings]
legacy_encoding = true

[settings.navigation_policy]
backtracking_allowed = true
skipping_allowed = false

[[questions]]
kind = "numeric"

[[responses]]
question = 0
state = "SAVED"
"#;
        let file = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(
            NavigationPolicy::resolve(&file.attempt.settings).unwrap(),
            NavigationPolicy::Composable {
                backtracking_allowed: true,
                skipping_allowed: false,
            }
        );
        assert_eq!(
            file.attempt.responses[&0],
            Response::legacy(LegacyState::Saved)
        );
    }

    #[test]
    fn reject_out_of_range_response() {
        let toml = r#"
[attempt]
title = "Broken"

[[questions]]
kind = "essay"

[[responses]]
question = 3
selection = { type = "essay", text = "hi" }
"#;
        let err = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn reject_unknown_policy() {
        let toml = r#"
[attempt]
title = "Bad policy"

[settings]
assessment_navigation_policy = "sideways"
"#;
        let err = parse_attempt_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("sideways"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_attempt_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_yolo_and_both_shapes() {
        let toml = r#"
[attempt]
title = "Loose"

[settings]
assessment_navigation_policy = "yolo"

[settings.navigation_policy]
backtracking_allowed = true

[[questions]]
kind = "essay"
"#;
        let file = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_attempt(&file.attempt);
        assert!(warnings.iter().any(|w| w.message.contains("yolo")));
        assert!(warnings.iter().any(|w| w.message.contains("both navigation")));
    }

    #[test]
    fn validate_flags_mismatched_selection_and_key() {
        let toml = r#"
[attempt]
title = "Mismatch"

[[questions]]
kind = "true_false"
answer_key = { type = "numeric", value = 3 }

[[responses]]
question = 0
selection = { type = "essay", text = "true" }
state = "SAVED"
"#;
        let file = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_attempt(&file.attempt);
        assert!(warnings
            .iter()
            .any(|w| w.question == Some(0) && w.message.contains("count as unanswered")));
        assert!(warnings.iter().any(|w| w.message.contains("answer key")));
        assert!(warnings.iter().any(|w| w.message.contains("legacy_encoding")));
    }

    #[test]
    fn validate_empty_attempt() {
        let toml = r#"
[attempt]
title = "Empty"
"#;
        let file = parse_attempt_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_attempt(&file.attempt);
        assert!(warnings.iter().any(|w| w.message.contains("no questions")));
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unit1.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not [toml").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = load_attempt_directory(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].attempt.title, "Unit 1 Check");
    }
}
