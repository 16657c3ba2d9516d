//! Scoring of submitted answers.
//!
//! Scoring trusts the question set handed back by the caller and never
//! re-derives questions. Unanswered or garbled submissions count as incorrect.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::Question;
use crate::traits::{Summarizer, SummaryRequest, TRACE_TARGET};

/// Selected label recorded for questions with no submitted answer.
pub const UNANSWERED: &str = "?";

/// Topics at or above this accuracy are reported as strong.
pub const STRONG_THRESHOLD: f64 = 70.0;
/// Topics below this accuracy are reported as needing practice.
pub const WEAK_THRESHOLD: f64 = 50.0;

/// Feedback for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    pub question: String,
    pub topic: String,
    pub selected_label: String,
    pub selected_text: String,
    pub correct_label: String,
    pub correct_text: String,
    pub is_correct: bool,
}

/// Full result of scoring one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// Percentage 0-100, two decimals.
    pub overall_accuracy: f64,
    /// Topic → percentage 0-100, two decimals.
    pub topic_accuracy: BTreeMap<String, f64>,
    /// Short textual summary.
    pub overall_feedback: String,
    /// One entry per question, in input order.
    pub feedback: Vec<QuestionFeedback>,
}

/// Accuracy figures before a summary is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally {
    pub overall_accuracy: f64,
    pub topic_accuracy: BTreeMap<String, f64>,
    pub feedback: Vec<QuestionFeedback>,
}

/// `100 * correct / total`, rounded to two decimals; `0.0` when `total == 0`.
pub fn accuracy(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = correct as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Compare every question against the answer map.
pub fn tally(questions: &[Question], answers: &HashMap<String, String>) -> Tally {
    let mut correct = 0usize;
    let mut per_topic: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut feedback = Vec::with_capacity(questions.len());

    for q in questions {
        let selected = answers
            .get(&q.id)
            .map(String::as_str)
            .unwrap_or(UNANSWERED);
        let is_correct = selected == q.answer;

        let entry = per_topic.entry(q.topic.as_str()).or_insert((0, 0));
        entry.1 += 1;
        if is_correct {
            entry.0 += 1;
            correct += 1;
        }

        feedback.push(QuestionFeedback {
            question: q.question.clone(),
            topic: q.topic.clone(),
            selected_label: selected.to_string(),
            selected_text: q.option_text(selected).to_string(),
            correct_label: q.answer.clone(),
            correct_text: q.option_text(&q.answer).to_string(),
            is_correct,
        });
    }

    Tally {
        overall_accuracy: accuracy(correct, questions.len()),
        topic_accuracy: per_topic
            .into_iter()
            .map(|(topic, (c, t))| (topic.to_string(), accuracy(c, t)))
            .collect(),
        feedback,
    }
}

/// Summary used when no summarizer is available or it fails.
pub fn rule_based_feedback(topic_accuracy: &BTreeMap<String, f64>) -> String {
    let strong: Vec<&str> = topic_accuracy
        .iter()
        .filter(|&(_, &acc)| acc >= STRONG_THRESHOLD)
        .map(|(t, _)| t.as_str())
        .collect();
    let weak: Vec<&str> = topic_accuracy
        .iter()
        .filter(|&(_, &acc)| acc < WEAK_THRESHOLD)
        .map(|(t, _)| t.as_str())
        .collect();

    let mut parts = Vec::new();
    if !strong.is_empty() {
        parts.push(format!("Strong in: {}.", strong.join(", ")));
    }
    if !weak.is_empty() {
        parts.push(format!("Needs practice: {}.", weak.join(", ")));
    }
    if parts.is_empty() {
        parts.push("Balanced performance. Keep practicing!".to_string());
    }
    parts.join(" ")
}

/// Scores submissions, optionally asking a summarizer for the overall text.
#[derive(Clone, Default)]
pub struct Scorer {
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl Scorer {
    pub fn new(summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { summarizer }
    }

    /// Score `questions` against `answers`. Neither input is modified.
    pub async fn score(
        &self,
        questions: &[Question],
        answers: &HashMap<String, String>,
    ) -> ScoreReport {
        let Tally {
            overall_accuracy,
            topic_accuracy,
            feedback,
        } = tally(questions, answers);

        let overall_feedback = self.summary(overall_accuracy, &topic_accuracy).await;

        ScoreReport {
            overall_accuracy,
            topic_accuracy,
            overall_feedback,
            feedback,
        }
    }

    async fn summary(
        &self,
        overall_accuracy: f64,
        topic_accuracy: &BTreeMap<String, f64>,
    ) -> String {
        if let Some(summarizer) = &self.summarizer {
            let request = SummaryRequest {
                overall_accuracy,
                topic_accuracy: topic_accuracy.clone(),
            };
            match summarizer.summarize(&request).await {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => tracing::warn!(
                    target: TRACE_TARGET,
                    "[feedback][fallback] {} returned an empty summary",
                    summarizer.name()
                ),
                Err(e) => tracing::warn!(
                    target: TRACE_TARGET,
                    "[feedback][fallback] reason={}: {e}",
                    e.kind()
                ),
            }
        }
        rule_based_feedback(topic_accuracy)
    }
}
