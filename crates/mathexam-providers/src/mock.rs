//! Mock generator and summarizer for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use mathexam_core::error::ProviderError;
use mathexam_core::model::LABELS;
use mathexam_core::traits::{
    QuestionGenerator, QuestionRequest, RawQuestion, Summarizer, SummaryRequest,
};

/// How a [`MockGenerator`] answers.
enum Behavior {
    /// Well-formed questions for the requested topic.
    Echo,
    /// Questions labeled with a different topic.
    WrongTopic(String),
    /// Canned raw items per topic; topics not listed get `Echo` output.
    Fixed(HashMap<String, Vec<RawQuestion>>),
    /// Always fail with a timeout.
    Failing,
}

/// A question generator that never leaves the process.
pub struct MockGenerator {
    behavior: Behavior,
    call_count: AtomicU32,
    last_request: Mutex<Option<QuestionRequest>>,
}

impl MockGenerator {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Produce `count` distinct questions for whichever topic is asked for.
    pub fn echo() -> Self {
        Self::with_behavior(Behavior::Echo)
    }

    /// Produce questions tagged with `topic` regardless of the request.
    pub fn wrong_topic(topic: &str) -> Self {
        Self::with_behavior(Behavior::WrongTopic(topic.to_string()))
    }

    /// Return the given raw items for matching topics.
    pub fn with_fixed_responses(responses: HashMap<String, Vec<RawQuestion>>) -> Self {
        Self::with_behavior(Behavior::Fixed(responses))
    }

    /// Fail every call.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Failing)
    }

    /// Number of calls made to this generator.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Last request received.
    pub fn last_request(&self) -> Option<QuestionRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn made_up(&self, topic: &str, count: usize) -> Vec<RawQuestion> {
        let call = self.call_count();
        (0..count)
            .map(|i| {
                let n = i + 1;
                let options = LABELS
                    .iter()
                    .enumerate()
                    .map(|(k, label)| (label.to_string(), serde_json::json!((n + k).to_string())))
                    .collect();
                RawQuestion {
                    id: Some(format!("mock_{call}_{i}")),
                    topic: Some(topic.to_string()),
                    question: Some(format!("{topic} question {n} (call {call})")),
                    options: Some(options),
                    answer: Some(LABELS[i % LABELS.len()].to_string()),
                    correct: None,
                }
            })
            .collect()
    }
}

#[async_trait]
impl QuestionGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_questions(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<RawQuestion>, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.clone());

        match &self.behavior {
            Behavior::Echo => Ok(self.made_up(&request.topic, request.count)),
            Behavior::WrongTopic(topic) => Ok(self.made_up(topic, request.count)),
            Behavior::Fixed(responses) => Ok(responses
                .get(&request.topic)
                .cloned()
                .unwrap_or_else(|| self.made_up(&request.topic, request.count))),
            Behavior::Failing => Err(ProviderError::Timeout(0)),
        }
    }
}

/// A summarizer returning a fixed text, or failing.
pub struct MockSummarizer {
    reply: Option<String>,
    call_count: AtomicU32,
}

impl MockSummarizer {
    pub fn with_fixed_response(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<String, ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.reply.clone().ok_or_else(|| ProviderError::ApiError {
            status: 503,
            message: "mock summarizer unavailable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mathexam_core::model::Difficulty;

    fn request(topic: &str, count: usize) -> QuestionRequest {
        QuestionRequest {
            topic: topic.into(),
            difficulty: Difficulty::Medium,
            count,
        }
    }

    #[tokio::test]
    async fn echo_response() {
        let generator = MockGenerator::echo();
        let items = generator
            .generate_questions(&request("Geometry", 3))
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|q| q.topic.as_deref() == Some("Geometry")));
        assert_eq!(generator.call_count(), 1);
        assert_eq!(generator.last_request().unwrap().count, 3);
    }

    #[tokio::test]
    async fn fixed_responses_by_topic() {
        let mut responses = HashMap::new();
        responses.insert("Algebra".to_string(), vec![RawQuestion::default()]);
        let generator = MockGenerator::with_fixed_responses(responses);

        let algebra = generator
            .generate_questions(&request("Algebra", 5))
            .await
            .unwrap();
        assert_eq!(algebra.len(), 1);

        let other = generator
            .generate_questions(&request("Integrals", 2))
            .await
            .unwrap();
        assert_eq!(other.len(), 2);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn failing_modes() {
        assert!(MockGenerator::failing()
            .generate_questions(&request("Algebra", 1))
            .await
            .is_err());

        let summarizer = MockSummarizer::failing();
        let err = summarizer
            .summarize(&SummaryRequest {
                overall_accuracy: 0.0,
                topic_accuracy: Default::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "api_error");
        assert_eq!(summarizer.call_count(), 1);
    }
}
