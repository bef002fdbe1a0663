//! LLM-backed agent runtime.
//!
//! Implements [`agent_core::Agent`] against an OpenAI-compatible chat
//! completions endpoint with function calling. The runtime builds the prompt
//! from the window it is handed, parses tool calls into typed invocations,
//! and returns an immutable [`agent_core::Turn`]. It holds no conversation
//! state of its own.

mod agent;
mod api_types;
mod config;

pub use agent::LlmAgent;
pub use config::LlmConfig;
