//! OpenAI-compatible chat completions client.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use mathexam_core::error::ProviderError;
use mathexam_core::traits::{
    parse_question_payload, question_prompt, QuestionGenerator, QuestionRequest, RawQuestion,
    Summarizer, SummaryRequest, QUESTION_SYSTEM_PROMPT, SUMMARY_SYSTEM_PROMPT, TRACE_TARGET,
};

use crate::config::OpenAiConfig;

/// Client for `POST {base_url}/v1/chat/completions`.
///
/// Serves both question generation and performance summaries.
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    summary_model: String,
    temperature: f64,
    max_tokens: u32,
    summary_max_tokens: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            summary_model: config.summary_model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            summary_max_tokens: config.summary_max_tokens,
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    /// Send one chat completion and return the first choice's content.
    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let start = Instant::now();
        tracing::info!(
            target: TRACE_TARGET,
            "[request] model={} payload={}",
            body.model,
            serde_json::to_string(body).unwrap_or_default()
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_secs)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            });
        }

        let api_response: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("failed to parse response: {e}"))
        })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::info!(
            target: TRACE_TARGET,
            "[response] model={} latency_ms={} content={}",
            body.model,
            start.elapsed().as_millis(),
            content
        );
        Ok(content)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl QuestionGenerator for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(topic = %request.topic, count = request.count))]
    async fn generate_questions(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<RawQuestion>, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: QUESTION_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: question_prompt(request).to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let content = self.complete(&body).await?;
        parse_question_payload(&content)
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request))]
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, ProviderError> {
        let payload = serde_json::json!({
            "overall_accuracy": request.overall_accuracy,
            "topic_accuracy": request.topic_accuracy,
        });
        let body = ChatRequest {
            model: &self.summary_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SUMMARY_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: payload.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.summary_max_tokens,
        };

        Ok(self.complete(&body).await?.trim().to_string())
    }
}
