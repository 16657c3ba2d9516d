//! Configuration loading and client factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mathexam_core::model::{Difficulty, DEFAULT_TOPICS};

use crate::openai::OpenAiClient;

/// Settings for the OpenAI-compatible endpoint.
///
/// Note: Custom Debug impl masks the API key to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Empty means "no credential": every request uses templates.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model for performance summaries; falls back to `model`.
    #[serde(default)]
    pub feedback_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let api_key = if self.api_key.is_empty() { "" } else { "***" };
        f.debug_struct("OpenAiConfig")
            .field("api_key", &api_key)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("feedback_model", &self.feedback_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            feedback_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OpenAiConfig {
    /// The API key, if one is configured.
    pub fn credential(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// Model used for summaries.
    pub fn summary_model(&self) -> &str {
        self.feedback_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.model)
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    1200
}
fn default_summary_max_tokens() -> u32 {
    200
}
fn default_timeout_secs() -> u64 {
    60
}

/// Top-level mathexam configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathExamConfig {
    /// Directory holding the question cache, history, and trace log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_topics")]
    pub default_topics: Vec<String>,
    #[serde(default)]
    pub default_difficulty: Difficulty,
    #[serde(default = "default_num_questions")]
    pub default_num_questions: usize,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
}
fn default_num_questions() -> usize {
    10
}

impl Default for MathExamConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_topics: default_topics(),
            default_difficulty: Difficulty::default(),
            default_num_questions: default_num_questions(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl MathExamConfig {
    /// Persistent question cache.
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("question_cache.json")
    }

    /// Per-user accuracy history.
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.jsonl")
    }

    /// Append-only diagnostic log for the external capability.
    pub fn trace_log_path(&self) -> PathBuf {
        self.data_dir.join("ai_logs.log")
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + len];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + len + 1..]);
    }
    result
}

fn resolve_openai_config(config: &mut OpenAiConfig) {
    config.api_key = resolve_env_vars(&config.api_key);
    config.base_url = resolve_env_vars(&config.base_url);
    config.model = resolve_env_vars(&config.model);
    config.feedback_model = config.feedback_model.as_deref().map(resolve_env_vars);
}

/// Apply `OPENAI_API_KEY`, `OPENAI_MATH_MODEL` and `OPENAI_FEEDBACK_MODEL`.
fn apply_env_overrides(config: &mut OpenAiConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.api_key = key;
    }
    if let Some(model) = lookup("OPENAI_MATH_MODEL").filter(|m| !m.is_empty()) {
        config.model = model;
    }
    if let Some(model) = lookup("OPENAI_FEEDBACK_MODEL").filter(|m| !m.is_empty()) {
        config.feedback_model = Some(model);
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `mathexam.toml` in the current directory
/// 2. `~/.config/mathexam/config.toml`
///
/// Environment variable overrides: `OPENAI_API_KEY`, `OPENAI_MATH_MODEL`,
/// `OPENAI_FEEDBACK_MODEL`.
pub fn load_config() -> Result<MathExamConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MathExamConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("mathexam.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config(
                &std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?,
            )
            .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => MathExamConfig::default(),
    };

    apply_env_overrides(&mut config.openai, |name| std::env::var(name).ok());
    resolve_openai_config(&mut config.openai);

    Ok(config)
}

fn parse_config(content: &str) -> Result<MathExamConfig> {
    Ok(toml::from_str::<MathExamConfig>(content)?)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("mathexam"))
}

/// Build the OpenAI client, or `None` when no credential is configured.
pub fn create_client(config: &OpenAiConfig) -> Result<Option<Arc<OpenAiClient>>> {
    if config.credential().is_none() {
        tracing::debug!("no OpenAI credential configured; AI modes use templates");
        return Ok(None);
    }
    Ok(Some(Arc::new(OpenAiClient::new(config)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_MATHEXAM_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_MATHEXAM_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_MATHEXAM_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_MATHEXAM_UNSET_VAR_XYZ}"), "");
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_MATHEXAM_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = MathExamConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.default_topics.len(), 5);
        assert_eq!(config.default_num_questions, 10);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.max_tokens, 1200);
        assert!(config.openai.credential().is_none());
        assert_eq!(config.cache_path(), PathBuf::from("./data/question_cache.json"));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
data_dir = "/tmp/exams"
default_topics = ["Algebra", "Geometry"]
default_difficulty = "hard"
default_num_questions = 4

[openai]
api_key = "sk-test"
model = "gpt-4.1-mini"
feedback_model = "gpt-4.1-nano"
temperature = 0.2
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.default_difficulty, Difficulty::Hard);
        assert_eq!(config.default_topics, vec!["Algebra", "Geometry"]);
        assert_eq!(config.openai.credential(), Some("sk-test"));
        assert_eq!(config.openai.summary_model(), "gpt-4.1-nano");
        assert_eq!(config.openai.timeout_secs, 60);
        assert_eq!(config.history_path(), PathBuf::from("/tmp/exams/history.jsonl"));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MATH_MODEL", "gpt-env"),
            ("OPENAI_FEEDBACK_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = OpenAiConfig {
            api_key: "sk-file".into(),
            ..OpenAiConfig::default()
        };
        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.credential(), Some("sk-env"));
        assert_eq!(config.model, "gpt-env");
        assert_eq!(config.summary_model(), "gpt-env");
    }

    #[test]
    fn debug_masks_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-secret".into(),
            ..OpenAiConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn no_credential_means_no_client() {
        assert!(create_client(&OpenAiConfig::default()).unwrap().is_none());
        let blank = OpenAiConfig {
            api_key: "   ".into(),
            ..OpenAiConfig::default()
        };
        assert!(create_client(&blank).unwrap().is_none());
    }
}
