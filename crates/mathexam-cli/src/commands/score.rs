//! The `mathexam score` command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Deserialize;

use mathexam_core::history::{HistorySink, JsonlHistory};
use mathexam_core::model::{ExamBatch, Question};
use mathexam_core::scoring::ScoreReport;
use mathexam_core::traits::Summarizer;
use mathexam_core::Scorer;
use mathexam_providers::config::{create_client, MathExamConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// An exam file: either a full generated batch or just its questions.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExamFile {
    Batch(ExamBatch),
    Questions(Vec<Question>),
}

impl ExamFile {
    fn into_questions(self) -> Vec<Question> {
        match self {
            ExamFile::Batch(batch) => batch.questions,
            ExamFile::Questions(questions) => questions,
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what}: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {what}: {}", path.display()))
}

pub async fn execute(
    config: &MathExamConfig,
    exam_path: PathBuf,
    answers_path: PathBuf,
    user: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let questions = read_json::<ExamFile>(&exam_path, "exam")?.into_questions();
    let answers: HashMap<String, String> = read_json(&answers_path, "answers")?;

    let summarizer = create_client(&config.openai)?.map(|c| c as Arc<dyn Summarizer>);
    let report = Scorer::new(summarizer).score(&questions, &answers).await;

    if let Some(user) = &user {
        let history = JsonlHistory::new(config.history_path());
        match history.record(user, &report.topic_accuracy) {
            Ok(()) => tracing::debug!("recorded history for user {user}"),
            Err(e) => tracing::warn!("could not record history for user {user}: {e:#}"),
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &ScoreReport) {
    let mut questions = Table::new();
    questions.set_header(vec!["#", "Topic", "Question", "Your answer", "Correct", "Result"]);
    for (i, fb) in report.feedback.iter().enumerate() {
        questions.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&fb.topic),
            Cell::new(&fb.question),
            Cell::new(format!("{} {}", fb.selected_label, fb.selected_text).trim_end()),
            Cell::new(format!("{} {}", fb.correct_label, fb.correct_text)),
            Cell::new(if fb.is_correct { "OK" } else { "WRONG" }),
        ]);
    }
    println!("{questions}");

    let mut topics = Table::new();
    topics.set_header(vec!["Topic", "Accuracy"]);
    for (topic, acc) in &report.topic_accuracy {
        topics.add_row(vec![Cell::new(topic), Cell::new(format!("{acc:.2}%"))]);
    }
    println!("\n{topics}");

    println!("\nOverall accuracy: {:.2}%", report.overall_accuracy);
    println!("Feedback: {}", report.overall_feedback);
}
