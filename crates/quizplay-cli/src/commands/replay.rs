//! The `quizplay replay` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use quizplay_core::parser;
use quizplay_core::report::AttemptReport;
use quizplay_core::session::{AttemptSession, ReplayStep, StepOutcome};
use quizplay_services::config::{create_persistence, load_config_from};
use quizplay_services::AnswerKeyScorer;

pub async fn execute(
    attempt_path: PathBuf,
    output: Option<PathBuf>,
    fail_saves: bool,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let json = match format.as_str() {
        "text" => false,
        "json" => true,
        other => anyhow::bail!("unknown format: {other} (expected text or json)"),
    };

    let config = load_config_from(config_path.as_deref())?;
    let file = parser::parse_attempt(&attempt_path)?;

    let persistence = create_persistence(&config.persistence);
    if fail_saves {
        persistence.set_fail_all(true);
    }

    let mut session =
        AttemptSession::new(file.attempt, persistence.clone(), Arc::new(AnswerKeyScorer))?;
    let start = session.open();

    if !json {
        println!(
            "Attempt: {} ({} questions, policy {})",
            session.attempt().title,
            session.attempt().question_count(),
            session.policy()
        );
        println!("Starting at {}", position(start));
    }

    for (i, step) in file.steps.iter().enumerate() {
        let outcome = session.run_step(step).await?;
        if !json {
            println!(
                "  [{}] {:<10} -> {:<24} now at {}",
                i + 1,
                step_label(step),
                outcome_label(&outcome),
                position(session.current_question())
            );
        }
    }

    let report = session.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if let Some(path) = output {
        report.save_json(&path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    tracing::debug!(calls = persistence.call_count(), "replay finished");
    Ok(())
}

fn position(index: Option<usize>) -> String {
    match index {
        Some(i) => format!("Q{i}"),
        None => "end".to_string(),
    }
}

fn step_label(step: &ReplayStep) -> String {
    match step {
        ReplayStep::Answer { .. } => "answer".into(),
        ReplayStep::Clear => "clear".into(),
        ReplayStep::Skip => "skip".into(),
        ReplayStep::Next => "next".into(),
        ReplayStep::Previous => "previous".into(),
        ReplayStep::GoTo { question } => format!("go_to Q{question}"),
        ReplayStep::Save => "save".into(),
        ReplayStep::Submit => "submit".into(),
        ReplayStep::Exit => "exit".into(),
    }
}

fn outcome_label(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Applied => "applied".into(),
        StepOutcome::Blocked => "blocked".into(),
        StepOutcome::Ignored => "ignored".into(),
        StepOutcome::Saved { count } => format!("saved {count}"),
        StepOutcome::SaveFailed { failed } => format!("save failed {failed:?}"),
        StepOutcome::Finished => "finished".into(),
    }
}

fn print_summary(report: &AttemptReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Q",
        "Kind",
        "Answered",
        "Skipped",
        "Score",
        "Unsaved",
        "Reachable",
    ]);

    let yes_no = |b: bool| if b { "yes" } else { "-" };
    for q in &report.questions {
        let score = match &q.score {
            Some(s) => format!(
                "{}/{}",
                s.points_awarded.map_or("?".to_string(), |p| p.to_string()),
                s.points_possible.map_or("?".to_string(), |p| p.to_string())
            ),
            None => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(q.index),
            Cell::new(q.kind),
            Cell::new(yes_no(q.status.answered)),
            Cell::new(yes_no(q.status.skipped)),
            Cell::new(score),
            Cell::new(yes_no(q.unsaved_edit)),
            Cell::new(yes_no(q.reachable)),
        ]);
    }

    println!("\n{table}");

    let s = &report.summary;
    println!(
        "\n{}/{} answered, {} skipped, {} scored, {} unsaved",
        s.answered, s.total, s.skipped, s.scored, s.unsaved
    );
    if report.last_save_failed {
        println!("Last save FAILED; unsaved edits are kept for retry.");
    }
    if let Some(at) = report.last_save_at {
        println!("Last saved at {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if report.should_exit {
        println!("Exit requested.");
    }
}
