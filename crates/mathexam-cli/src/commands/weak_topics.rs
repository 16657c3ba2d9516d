//! The `mathexam weak-topics` command.

use anyhow::Result;

use mathexam_core::history::JsonlHistory;
use mathexam_providers::config::MathExamConfig;

use super::parse_topics;

pub fn execute(config: &MathExamConfig, user: String, topics: Option<String>) -> Result<()> {
    let defaults = parse_topics(topics.as_deref(), &config.default_topics);
    let history = JsonlHistory::new(config.history_path());

    if !history.path().exists() {
        eprintln!("No history recorded yet; showing default topics.");
    }
    for topic in history.weak_topics(&user, &defaults) {
        println!("{topic}");
    }
    Ok(())
}
