//! Agent error types.

use thiserror::Error;

/// Errors that can occur while producing a turn.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure reaching the model provider.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered but the response was unusable.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The advance exceeded its deadline. The orchestrator turns this into
    /// a fallback apology message.
    #[error("agent timed out after {0} seconds")]
    Timeout(u64),
}
