//! Core data model types for mathexam.
//!
//! Questions, exam batches, and the request enums shared by the assembler,
//! the scorer, and the CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed option alphabet, in display order.
pub const LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// Topics used when a request does not name any.
pub const DEFAULT_TOPICS: [&str; 5] = [
    "Algebra",
    "Functions",
    "Integrals",
    "Derivatives",
    "Geometry",
];

/// Topic assigned to questions that arrive without one.
pub const GENERAL_TOPIC: &str = "General";

/// A single multiple-choice question.
///
/// Deserialization is lenient so that question sets handed back by clients
/// for scoring never fail to load: missing fields take empty defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Opaque identifier, unique within a batch.
    pub id: String,
    /// Topic the question belongs to.
    #[serde(default = "general_topic")]
    pub topic: String,
    /// Prompt text.
    #[serde(default)]
    pub question: String,
    /// Option label → option text.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Label of the correct option.
    #[serde(default)]
    pub answer: String,
}

fn general_topic() -> String {
    GENERAL_TOPIC.to_string()
}

impl Question {
    /// Dedup key used for repeat avoidance: prompt text plus id.
    pub fn signature(&self) -> String {
        crate::ids::signature(&self.question, &self.id)
    }

    /// Text of the option behind `label`, or `""` if the label does not resolve.
    pub fn option_text(&self, label: &str) -> &str {
        self.options.get(label).map(String::as_str).unwrap_or("")
    }
}

/// Mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamMode {
    Deterministic,
    Ai,
    AiAdaptive,
}

impl ExamMode {
    /// Whether this mode asks for the external generation capability.
    pub fn wants_external(self) -> bool {
        matches!(self, ExamMode::Ai | ExamMode::AiAdaptive)
    }
}

impl fmt::Display for ExamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamMode::Deterministic => write!(f, "deterministic"),
            ExamMode::Ai => write!(f, "ai"),
            ExamMode::AiAdaptive => write!(f, "ai_adaptive"),
        }
    }
}

impl FromStr for ExamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deterministic" => Ok(ExamMode::Deterministic),
            "ai" => Ok(ExamMode::Ai),
            "ai_adaptive" | "ai-adaptive" | "adaptive" => Ok(ExamMode::AiAdaptive),
            other => Err(format!("unknown exam mode: {other}")),
        }
    }
}

/// Mode a batch was actually produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    Deterministic,
    Ai,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::Deterministic => write!(f, "deterministic"),
            BatchMode::Ai => write!(f, "ai"),
        }
    }
}

/// Requested question difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// A generated exam, handed to the caller as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamBatch {
    /// Questions in presentation order.
    pub questions: Vec<Question>,
    /// How the batch was produced.
    pub mode: BatchMode,
    /// How many questions short of the request the batch is.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub shortfall: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl ExamBatch {
    /// Number of questions per topic, sorted by topic name.
    pub fn topic_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for q in &self.questions {
            *counts.entry(q.topic.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Parameters of a single exam generation call.
#[derive(Debug, Clone)]
pub struct ExamRequest {
    /// Topics to draw from; empty means [`DEFAULT_TOPICS`].
    pub topics: Vec<String>,
    /// Exact number of questions wanted.
    pub num_questions: usize,
    pub mode: ExamMode,
    pub difficulty: Difficulty,
    /// Skip questions whose signature was already used in this batch.
    pub avoid_repeat: bool,
}

impl Default for ExamRequest {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            num_questions: 10,
            mode: ExamMode::Deterministic,
            difficulty: Difficulty::Medium,
            avoid_repeat: true,
        }
    }
}

impl ExamRequest {
    /// Topics with defaults applied and duplicates removed, first occurrence wins.
    pub fn normalized_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic in &self.topics {
            let topic = topic.trim();
            if !topic.is_empty() && !topics.iter().any(|t| t == topic) {
                topics.push(topic.to_string());
            }
        }
        if topics.is_empty() {
            topics = DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect();
        }
        topics
    }
}
