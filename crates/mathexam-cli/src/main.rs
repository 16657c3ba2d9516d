//! mathexam CLI: the user-facing command-line interface.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use mathexam_core::model::{Difficulty, ExamMode};
use mathexam_core::traits::TRACE_TARGET;
use mathexam_providers::config::load_config_from;

mod commands;

use commands::score::OutputFormat;

#[derive(Parser)]
#[command(name = "mathexam", version, about = "Math exam generator and scorer")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an exam and print it as JSON
    Generate {
        /// Comma-separated topics (default: from config)
        #[arg(long)]
        topics: Option<String>,

        /// Number of questions (default: from config)
        #[arg(long)]
        num_questions: Option<usize>,

        /// Generation mode: deterministic, ai, ai_adaptive
        #[arg(long, default_value = "deterministic")]
        mode: ExamMode,

        /// Difficulty: easy, medium, hard (default: from config)
        #[arg(long)]
        difficulty: Option<Difficulty>,

        /// Keep questions that repeat an earlier one
        #[arg(long)]
        allow_repeats: bool,

        /// User whose history drives ai_adaptive topic selection
        #[arg(long)]
        user: Option<String>,

        /// Seed for reproducible template output
        #[arg(long)]
        seed: Option<u64>,

        /// Write the exam to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Score submitted answers against an exam
    Score {
        /// Exam JSON (a generated batch or a bare question array)
        #[arg(long)]
        exam: PathBuf,

        /// Answers JSON object mapping question id to label
        #[arg(long)]
        answers: PathBuf,

        /// Record per-topic accuracy for this user
        #[arg(long)]
        user: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a user's weakest topics from recorded history
    WeakTopics {
        #[arg(long)]
        user: String,

        /// Comma-separated fallback topics (default: from config)
        #[arg(long)]
        topics: Option<String>,
    },

    /// Create a starter mathexam.toml
    Init,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => {
            init_tracing(None);
            commands::init::execute()
        }
        command => run(command, cli.config.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(command: Commands, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = match load_config_from(config_path) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(None);
            return Err(e);
        }
    };
    init_tracing(Some(&config.trace_log_path()));
    tracing::debug!(?config, "configuration loaded");

    match command {
        Commands::Generate {
            topics,
            num_questions,
            mode,
            difficulty,
            allow_repeats,
            user,
            seed,
            output,
        } => {
            commands::generate::execute(
                &config,
                topics,
                num_questions,
                mode,
                difficulty,
                allow_repeats,
                user,
                seed,
                output,
            )
            .await
        }
        Commands::Score {
            exam,
            answers,
            user,
            format,
        } => commands::score::execute(&config, exam, answers, user, format).await,
        Commands::WeakTopics { user, topics } => {
            commands::weak_topics::execute(&config, user, topics)
        }
        Commands::Init => commands::init::execute(),
    }
}

/// Human-facing logs on stderr, plus the diagnostic trace target appended to
/// `trace_log` when it can be opened.
fn init_tracing(trace_log: Option<&Path>) {
    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mathexam=info,mathexam::trace=warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let file_layer = trace_log.and_then(open_trace_log).map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(Targets::new().with_target(TRACE_TARGET, LevelFilter::DEBUG))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_trace_log(path: &Path) -> Option<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}
