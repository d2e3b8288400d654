//! The `quizplay init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("quizplay.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("attempts")?;
    write_if_missing(Path::new("attempts/example.toml"), EXAMPLE_ATTEMPT)?;

    std::fs::create_dir_all("grades")?;
    write_if_missing(Path::new("grades/example.json"), EXAMPLE_GRADES)?;

    println!("\nNext steps:");
    println!("  1. Run: quizplay validate --attempt attempts/example.toml");
    println!("  2. Run: quizplay replay --attempt attempts/example.toml");
    println!("  3. Run: quizplay completion --snapshots grades/example.json");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizplay configuration

learner_id = "learner"

[persistence]
type = "memory"
# Question indices whose saves are always rejected.
fail_indices = []
fail_all = false

[notifier]
# stdout (JSON lines) or log
type = "stdout"
"#;

const EXAMPLE_ATTEMPT: &str = r#"[attempt]
title = "Example Attempt"

[settings]
assessment_navigation_policy = "require_answer"
score_release = "on_submit"

[[questions]]
kind = "multiple_choice"
prompt = "Which keyword declares an immutable binding?"
correct_answer = true
answer_key = { type = "multiple_choice", choice = "let" }

[[questions]]
kind = "true_false"
prompt = "A move leaves the source binding usable."
correct_answer = true
answer_key = { type = "true_false", value = false }

[[questions]]
kind = "short_answer"
prompt = "Name the component that enforces borrowing rules."
answer_key = { type = "short_answer", text = "borrow checker" }

[[steps]]
action = "answer"
selection = { type = "multiple_choice", choice = "let" }

[[steps]]
action = "next"

[[steps]]
action = "answer"
selection = { type = "true_false", value = false }

[[steps]]
action = "save"

[[steps]]
action = "next"

[[steps]]
action = "answer"
selection = { type = "short_answer", text = "Borrow Checker" }

[[steps]]
action = "submit"
"#;

const EXAMPLE_GRADES: &str = r#"[
  {
    "learner_id": "learner",
    "aggregate": { "score": 40.0 },
    "items": [{ "id": "quiz-1" }, { "id": "essay-1" }],
    "item_grades": { "quiz-1": 4.0, "essay-1": null }
  },
  {
    "learner_id": "learner",
    "aggregate": { "score": 85.0 },
    "items": [{ "id": "quiz-1" }, { "id": "essay-1" }],
    "item_grades": { "quiz-1": 4.0, "essay-1": 9.0 }
  },
  {
    "learner_id": "learner",
    "aggregate": { "score": 85.0 },
    "items": [{ "id": "quiz-1" }, { "id": "essay-1" }],
    "item_grades": { "quiz-1": 4.0, "essay-1": 9.0 }
  }
]
"#;
