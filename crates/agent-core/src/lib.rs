//! Core trait and types for agent implementations.
//!
//! This crate defines the contract between the conversation orchestrator and
//! whatever produces assistant turns:
//!
//! - [`Agent`] — the trait an LLM runtime (or a scripted test double)
//!   implements.
//! - [`Turn`] / [`ToolInvocation`] — the immutable value an advance returns.
//!   The agent never touches persistent state; every side effect travels
//!   through the returned turn for the orchestrator to apply.
//! - [`ToolDefinition`] and the stage-gated catalogue in [`tools`].
//! - [`Window`] — the bounded history window handed to the agent.

mod error;
mod history;
mod tools;
mod trait_def;
mod turn;

pub use error::AgentError;
pub use history::{ChatEntry, Window};
pub use tools::{catalogue_for, ToolDefinition};
pub use trait_def::{AdvanceRequest, Agent};
pub use turn::{ToolInvocation, Turn};

// Re-export async_trait for implementors.
pub use async_trait::async_trait;
