//! Conversation orchestrator.
//!
//! The single integration point of the system: receives inbound user
//! messages, drives the agent, applies tool effects against the store and
//! calendar, recomputes the qualification stage, dispatches replies, and
//! publishes events — all serialized per conversation through a keyed
//! mailbox.

pub mod effects;
pub mod error;
pub mod events;
pub mod mailbox;
pub mod orchestrator;
pub mod reconcile;
pub mod sender;
pub mod sweep;
pub mod view;

pub use error::OrchestratorError;
pub use events::{ConversationEvent, EventPublisher, NoOpPublisher, RecordingPublisher};
pub use mailbox::ConversationRouter;
pub use orchestrator::{InboundText, Orchestrator, OrchestratorConfig};
pub use sender::{NoOpSender, RecordingSender, ReplySender, WhatsAppSender};
