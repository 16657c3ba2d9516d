//! The `mathexam generate` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use mathexam_core::cache::JsonFileStore;
use mathexam_core::history::JsonlHistory;
use mathexam_core::model::{Difficulty, ExamBatch, ExamMode, ExamRequest};
use mathexam_core::templates::is_known_topic;
use mathexam_core::traits::QuestionGenerator;
use mathexam_core::ExamAssembler;
use mathexam_providers::config::{create_client, MathExamConfig};

use super::parse_topics;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    config: &MathExamConfig,
    topics: Option<String>,
    num_questions: Option<usize>,
    mode: ExamMode,
    difficulty: Option<Difficulty>,
    allow_repeats: bool,
    user: Option<String>,
    seed: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut topics = parse_topics(topics.as_deref(), &config.default_topics);

    if mode == ExamMode::AiAdaptive {
        if let Some(user) = &user {
            topics = JsonlHistory::new(config.history_path()).weak_topics(user, &topics);
            eprintln!("Adaptive exam for user {user}: {}", topics.join(", "));
        }
    }

    let request = ExamRequest {
        topics,
        num_questions: num_questions.unwrap_or(config.default_num_questions),
        mode,
        difficulty: difficulty.unwrap_or(config.default_difficulty),
        avoid_repeat: !allow_repeats,
    };

    let generator: Option<Arc<dyn QuestionGenerator>> = if mode.wants_external() {
        create_client(&config.openai)?.map(|c| c as Arc<dyn QuestionGenerator>)
    } else {
        None
    };
    let store = Arc::new(JsonFileStore::new(config.cache_path()));

    let mut assembler = ExamAssembler::new(generator, store);
    if let Some(seed) = seed {
        assembler = assembler.with_seed(seed);
    }
    if mode.wants_external() && !assembler.has_generator() {
        eprintln!("No OpenAI API key configured; using built-in templates.");
    }
    for topic in request.topics.iter().filter(|t| !is_known_topic(t)) {
        tracing::info!("no templates for topic {topic:?}; template fallback uses arithmetic");
    }

    let batch = assembler.generate_exam(&request).await?;
    let json = serde_json::to_string_pretty(&batch)?;

    match &output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, json)
                .with_context(|| format!("failed to write exam to {}", path.display()))?;
            eprintln!("Exam saved to: {}", path.display());
        }
        None => println!("{json}"),
    }

    print_summary(&batch);
    Ok(())
}

fn print_summary(batch: &ExamBatch) {
    let mut table = Table::new();
    table.set_header(vec!["Topic", "Questions"]);
    for (topic, count) in batch.topic_counts() {
        table.add_row(vec![Cell::new(topic), Cell::new(count)]);
    }

    eprintln!("\n{table}");
    eprintln!("{} questions ({} mode)", batch.questions.len(), batch.mode);
    if batch.shortfall > 0 {
        eprintln!(
            "Warning: {} question(s) short of the requested count",
            batch.shortfall
        );
    }
}
