//! The Agent trait.

use async_trait::async_trait;
use qualification::Step;

use crate::error::AgentError;
use crate::history::Window;
use crate::tools::ToolDefinition;
use crate::turn::Turn;

/// Everything an agent sees for one advance.
#[derive(Debug, Clone)]
pub struct AdvanceRequest {
    /// Bounded conversation window, preamble first.
    pub window: Window,
    /// The lead's current qualification stage.
    pub stage: Step,
    /// Tools valid at this stage; the agent must not invoke anything else.
    pub tools: Vec<ToolDefinition>,
}

/// A producer of assistant turns.
///
/// Implementations are side-effect-free with respect to persistent storage:
/// everything the turn should change travels back inside the [`Turn`] for
/// the orchestrator to apply.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce the next turn for a conversation.
    async fn advance(&self, request: AdvanceRequest) -> Result<Turn, AgentError>;

    /// Implementation name, for logs.
    fn name(&self) -> &str;
}
