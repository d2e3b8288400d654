//! The `quizplay validate` command.

use std::path::PathBuf;

use anyhow::Result;

use quizplay_core::parser;
use quizplay_core::policy::NavigationPolicy;

pub fn execute(attempt_path: PathBuf) -> Result<()> {
    let files = if attempt_path.is_dir() {
        parser::load_attempt_directory(&attempt_path)?
    } else {
        vec![parser::parse_attempt(&attempt_path)?]
    };

    let mut total_warnings = 0;

    for file in &files {
        let attempt = &file.attempt;
        let policy = NavigationPolicy::resolve(&attempt.settings)?;
        println!(
            "Attempt: {} ({} questions, {} steps, policy {policy})",
            attempt.title,
            attempt.question_count(),
            file.steps.len()
        );

        let warnings = parser::validate_attempt(attempt);
        for w in &warnings {
            let prefix = w
                .question
                .map(|q| format!("  [Q{q}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if files.is_empty() {
        println!("No attempt files found.");
    } else if total_warnings == 0 {
        println!("All attempts valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
