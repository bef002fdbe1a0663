//! Scripted agent implementations for testing.
//!
//! [`ScriptedAgent`] replays a fixed sequence of recorded turns, which lets
//! orchestrator and end-to-end tests drive the whole pipeline without a
//! model provider. [`EchoAgent`] answers every advance with the last user
//! entry, for smoke tests.

use std::collections::VecDeque;

use agent_core::{async_trait, AdvanceRequest, Agent, AgentError, Turn};
use tokio::sync::Mutex;

/// Replays a queue of turns in order. When the script runs dry it returns a
/// configurable fallback turn.
pub struct ScriptedAgent {
    script: Mutex<VecDeque<Turn>>,
    fallback: Turn,
    /// Stages observed by successive advances, for assertions.
    seen_stages: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    /// Create an agent that will replay `turns` in order.
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            fallback: Turn::text("(script exhausted)"),
            seen_stages: Mutex::new(Vec::new()),
        }
    }

    /// Replace the turn returned after the script is exhausted.
    pub fn with_fallback(mut self, fallback: Turn) -> Self {
        self.fallback = fallback;
        self
    }

    /// Stages the agent has been advanced at, in order.
    pub async fn seen_stages(&self) -> Vec<String> {
        self.seen_stages.lock().await.clone()
    }

    /// Turns left in the script.
    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn advance(&self, request: AdvanceRequest) -> Result<Turn, AgentError> {
        self.seen_stages
            .lock()
            .await
            .push(request.stage.as_str().to_string());

        let mut script = self.script.lock().await;
        Ok(script.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "scripted-agent"
    }
}

/// Echoes the last user entry of the window.
#[derive(Debug, Default)]
pub struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn advance(&self, request: AdvanceRequest) -> Result<Turn, AgentError> {
        let last_user = request
            .window
            .entries()
            .iter()
            .rev()
            .find(|e| e.role == "user")
            .map(|e| e.content.clone())
            .unwrap_or_default();
        Ok(Turn::text(last_user))
    }

    fn name(&self) -> &str {
        "echo-agent"
    }
}
