//! LLM runtime configuration.

use std::env;

/// Configuration for the chat completions client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API base URL (OpenAI-compatible).
    pub api_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// History window size (non-system entries).
    pub max_history: usize,
}

impl LlmConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `LLM_API_KEY` | Bearer token (required) | |
    /// | `LLM_MODEL` | Model id | `gpt-4o` |
    /// | `LLM_API_URL` | Base URL | `https://api.openai.com/v1` |
    /// | `LLM_MAX_HISTORY` | Window size | `10` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::var("LLM_API_KEY").map_err(|_| ConfigError::MissingApiKey)?;
        let max_history = env::var("LLM_MAX_HISTORY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            api_url: env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key,
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            temperature: 0.2,
            max_tokens: 1024,
            max_history,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("LLM_API_KEY environment variable is required")]
    MissingApiKey,
}
