//! Trait definitions for the external text-generation capabilities.
//!
//! Implemented by the `mathexam-providers` crate. Both traits return typed
//! results; callers treat any `Err` as a trigger for their deterministic
//! fallback.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::model::Difficulty;

/// Tracing target for request/response/fallback diagnostics.
///
/// The CLI routes this target to an append-only log file.
pub const TRACE_TARGET: &str = "mathexam::trace";

// ---------------------------------------------------------------------------
// Question generation
// ---------------------------------------------------------------------------

/// A remote capability that writes questions for a topic.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Ask for `request.count` questions. The items are not trusted and are
    /// sanitized by the caller.
    async fn generate_questions(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<RawQuestion>, ProviderError>;
}

/// Request for one topic's batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub topic: String,
    pub difficulty: Difficulty,
    pub count: usize,
}

/// A question as returned by an external service, before sanitization.
///
/// Scalar fields accept strings and numbers; anything else reads as absent so
/// one odd item never fails the whole response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuestion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub topic: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient_options")]
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer: Option<String>,
    /// Some models name the answer field `correct`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub correct: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_options<'de, D>(
    deserializer: D,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Summarization
// ---------------------------------------------------------------------------

/// A remote capability that writes a short performance summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Summarize the computed accuracies in a few sentences.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, ProviderError>;
}

/// Input to the summarizer: the accuracies already computed by scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub overall_accuracy: f64,
    pub topic_accuracy: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// System prompt for question generation.
pub const QUESTION_SYSTEM_PROMPT: &str = "You are a math question generator. Produce multiple-choice questions with one correct answer. Output JSON only. Choices labeled A-D.";

/// System prompt for performance summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a helpful math coach. Summarize student performance in 2-3 sentences: mention strong topics, weak topics, and give encouraging next steps. Keep it concise and motivational.";

/// Build the JSON user message describing the wanted questions.
pub fn question_prompt(request: &QuestionRequest) -> serde_json::Value {
    serde_json::json!({
        "topic": request.topic,
        "difficulty": request.difficulty,
        "num_questions": request.count,
        "format": {
            "id": "string",
            "topic": "string",
            "question": "string",
            "options": {"A": "string", "B": "string", "C": "string", "D": "string"},
            "answer": "A|B|C|D"
        },
        "instructions": "Return an array named 'questions' where each element matches the format. IDs must be unique. Questions must be solvable and unambiguous."
    })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Strip a surrounding markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse a generation response into raw questions.
///
/// Accepts `{"questions": [...]}` or a bare array, optionally fenced. Array
/// entries that are not objects are skipped.
pub fn parse_question_payload(response: &str) -> Result<Vec<RawQuestion>, ProviderError> {
    let body = strip_code_fence(response);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("not JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(ProviderError::MalformedResponse(
                    "object without a 'questions' array".into(),
                ))
            }
        },
        other => {
            return Err(ProviderError::MalformedResponse(format!(
                "expected array or object, got {other}"
            )))
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::warn!(target: TRACE_TARGET, "[question_gen] skipping item: {e}");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_wrapped_questions() {
        let body = r#"{"questions": [{"id": "x1", "topic": "Algebra", "question": "1+1?",
            "options": {"A": "2", "B": "3", "C": "4", "D": "5"}, "answer": "A"}]}"#;
        let items = parse_question_payload(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_deref(), Some("x1"));
        assert_eq!(items[0].options.as_ref().unwrap().len(), 4);
    }

    #[test]
    fn parse_bare_array_in_fence() {
        let body = "```json\n[{\"question\": \"2+2?\", \"correct\": \"B\"}]\n```";
        let items = parse_question_payload(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].correct.as_deref(), Some("B"));
        assert!(items[0].id.is_none());
    }

    #[test]
    fn odd_scalar_fields_do_not_sink_the_response() {
        let body = r#"{"questions": [
            {"id": "x1", "topic": "Algebra", "question": "1+1?",
             "options": {"A": "2", "B": "3", "C": "4", "D": "5"}, "answer": "A"},
            {"id": 7, "topic": "Algebra", "question": "2+2?",
             "options": {"A": 4, "B": 5, "C": 6, "D": 7}, "answer": 2},
            {"id": null, "question": ["not", "text"], "options": "A-D", "correct": true}
        ]}"#;
        let items = parse_question_payload(body).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].answer.as_deref(), Some("A"));
        assert_eq!(items[1].id.as_deref(), Some("7"));
        assert_eq!(items[1].answer.as_deref(), Some("2"));
        assert!(items[2].id.is_none());
        assert!(items[2].question.is_none());
        assert!(items[2].options.is_none());
        assert!(items[2].correct.is_none());

        let mixed = parse_question_payload(r#"["just text", {"question": "3+3?"}]"#).unwrap();
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].question.as_deref(), Some("3+3?"));
    }

    #[test]
    fn parse_rejects_prose() {
        let err = parse_question_payload("Sure! Here are your questions.").unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn parse_rejects_object_without_questions() {
        assert!(parse_question_payload(r#"{"items": []}"#).is_err());
        assert!(parse_question_payload("42").is_err());
    }

    #[test]
    fn strip_fence_without_fence_is_identity() {
        assert_eq!(strip_code_fence("  [1, 2] "), "[1, 2]");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
    }

    #[test]
    fn prompt_carries_request() {
        let prompt = question_prompt(&QuestionRequest {
            topic: "Geometry".into(),
            difficulty: Difficulty::Hard,
            count: 3,
        });
        assert_eq!(prompt["topic"], "Geometry");
        assert_eq!(prompt["difficulty"], "hard");
        assert_eq!(prompt["num_questions"], 3);
    }
}
