//! The LLM agent implementation.

use agent_core::{async_trait, AdvanceRequest, Agent, AgentError, ToolInvocation, Turn};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::api_types::{ApiError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::LlmConfig;

/// Agent implementation backed by an OpenAI-compatible chat API.
pub struct LlmAgent {
    client: Client,
    config: LlmConfig,
}

impl LlmAgent {
    /// Create a new agent with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| AgentError::Configuration(format!("failed to build HTTP client: {e}")))?;

        info!(model = %config.model, "LLM agent initialized");
        Ok(Self { client, config })
    }

    /// Create an agent from environment variables.
    pub fn from_env() -> Result<Self, AgentError> {
        let config = LlmConfig::from_env()
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        Self::new(config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, AgentError> {
        let url = format!("{}/chat/completions", self.config.api_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(60)
                } else {
                    AgentError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(AgentError::ProcessingFailed(format!(
                    "API error ({}): {}",
                    status.as_u16(),
                    api_error.error.message
                )));
            }
            return Err(AgentError::ProcessingFailed(format!(
                "API error ({}): {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::ProcessingFailed(format!("bad response body: {e}")))
    }
}

#[async_trait]
impl Agent for LlmAgent {
    async fn advance(&self, request: AdvanceRequest) -> Result<Turn, AgentError> {
        let messages: Vec<ChatMessage> = request
            .window
            .entries()
            .iter()
            .map(|e| ChatMessage {
                role: e.role.clone(),
                content: e.content.clone(),
            })
            .collect();

        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|t| serde_json::to_value(t))
            .collect::<Result<_, _>>()
            .map_err(|e| AgentError::ProcessingFailed(e.to_string()))?;

        let api_request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            tools: (!tools.is_empty()).then_some(tools),
        };

        debug!(stage = %request.stage, "requesting completion");
        let response = self.chat_completion(&api_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::ProcessingFailed("no choices in response".into()))?;

        let mut turn = Turn {
            assistant_text: choice.message.content.unwrap_or_default(),
            tool_invocations: Vec::new(),
        };

        for call in choice.message.tool_calls {
            match ToolInvocation::parse(&call.function.name, &call.function.arguments) {
                Ok(invocation) => turn.tool_invocations.push(invocation),
                // A single malformed call is dropped rather than failing the
                // whole turn; the stage machine simply will not advance.
                Err(e) => warn!(call_id = %call.id, error = %e, "dropping malformed tool call"),
            }
        }

        debug!(
            tools = turn.tool_invocations.len(),
            chars = turn.assistant_text.len(),
            "turn produced"
        );
        Ok(turn)
    }

    fn name(&self) -> &str {
        "llm-agent"
    }
}
