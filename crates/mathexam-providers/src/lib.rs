//! mathexam-providers: external question generation and configuration.
//!
//! Implements the `QuestionGenerator` and `Summarizer` traits against an
//! OpenAI-compatible chat completions API, and loads the mathexam
//! configuration that decides whether that API is used at all.

pub mod config;
pub mod mock;
pub mod openai;

pub use config::{create_client, load_config, load_config_from, MathExamConfig, OpenAiConfig};
pub use mathexam_core::error::ProviderError;
pub use openai::OpenAiClient;
