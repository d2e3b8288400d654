//! quizplay CLI: validate attempt files, replay scripted attempts and run
//! completion checks.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quizplay", version, about = "Assessment-attempt engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate attempt TOML files
    Validate {
        /// Path to an attempt file or directory
        #[arg(long)]
        attempt: PathBuf,
    },

    /// Replay the scripted steps of an attempt file
    Replay {
        /// Path to the attempt file
        #[arg(long)]
        attempt: PathBuf,

        /// Write the final attempt report as JSON
        #[arg(long)]
        output: Option<PathBuf>,

        /// Reject every save
        #[arg(long)]
        fail_saves: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Feed grade snapshots through the completion detector
    Completion {
        /// JSON array of grade snapshots, oldest first
        #[arg(long)]
        snapshots: PathBuf,

        /// Learner to evaluate (defaults to the configured learner)
        #[arg(long)]
        learner: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config, example attempt and grade snapshots
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quizplay=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { attempt } => commands::validate::execute(attempt),
        Commands::Replay {
            attempt,
            output,
            fail_saves,
            format,
            config,
        } => commands::replay::execute(attempt, output, fail_saves, format, config).await,
        Commands::Completion {
            snapshots,
            learner,
            config,
        } => commands::completion::execute(snapshots, learner, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
