//! Error types for orchestration.

use agent_core::AgentError;
use database::DatabaseError;
use thiserror::Error;

/// Errors that can occur while processing a turn.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Store failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Agent failure that was not recoverable into a fallback reply.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// The conversation does not exist.
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    /// The mailbox for this conversation shut down mid-dispatch.
    #[error("conversation mailbox closed")]
    MailboxClosed,
}
