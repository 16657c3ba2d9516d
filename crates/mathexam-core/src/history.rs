//! Per-user accuracy history and weak-topic selection.
//!
//! Every scored submission appends one row per topic. The history feeds the
//! adaptive mode, which narrows an exam to the topics a user does worst in.

use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of topics the adaptive selection returns.
const MIN_WEAK_TOPICS: usize = 2;

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: String,
    pub topic: String,
    pub accuracy: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only sink for accuracy rows. Callers treat failures as non-fatal.
pub trait HistorySink: Send + Sync {
    fn record(&self, user_id: &str, topic_accuracy: &BTreeMap<String, f64>) -> Result<()>;
}

/// History kept as JSON lines in a single file.
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every readable row. Malformed lines are skipped.
    pub fn load(&self) -> Result<Vec<HistoryRecord>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history from {}", self.path.display()))?;
        let mut records = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "skipping history line {} in {}: {e}",
                    lineno + 1,
                    self.path.display()
                ),
            }
        }
        Ok(records)
    }

    /// The user's weakest topics, or `defaults` when there is no usable history.
    pub fn weak_topics(&self, user_id: &str, defaults: &[String]) -> Vec<String> {
        if !self.path.exists() {
            return defaults.to_vec();
        }
        match self.load() {
            Ok(records) => {
                let topics = weakest_topics(&records, user_id);
                if topics.is_empty() {
                    defaults.to_vec()
                } else {
                    topics
                }
            }
            Err(e) => {
                tracing::warn!("history unavailable, using default topics: {e:#}");
                defaults.to_vec()
            }
        }
    }
}

impl HistorySink for JsonlHistory {
    fn record(&self, user_id: &str, topic_accuracy: &BTreeMap<String, f64>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history {}", self.path.display()))?;

        let recorded_at = Utc::now();
        let mut buf = String::new();
        for (topic, &accuracy) in topic_accuracy {
            let record = HistoryRecord {
                user_id: user_id.to_string(),
                topic: topic.clone(),
                accuracy,
                recorded_at,
            };
            buf.push_str(&serde_json::to_string(&record)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// Average accuracy per topic for `user_id`, ascending; the bottom half of
/// the topics but never fewer than two (or all of them if there are fewer).
pub fn weakest_topics(records: &[HistoryRecord], user_id: &str) -> Vec<String> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for r in records.iter().filter(|r| r.user_id == user_id) {
        let entry = sums.entry(r.topic.as_str()).or_insert((0.0, 0));
        entry.0 += r.accuracy;
        entry.1 += 1;
    }

    let mut averages: Vec<(&str, f64)> = sums
        .into_iter()
        .map(|(topic, (sum, n))| (topic, sum / n as f64))
        .collect();
    averages.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let k = (averages.len() / 2).max(MIN_WEAK_TOPICS);
    averages
        .into_iter()
        .take(k)
        .map(|(topic, _)| topic.to_string())
        .collect()
}
