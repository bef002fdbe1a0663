//! Conversation events and the publisher seam.
//!
//! Events are published strictly after the store write they describe has
//! committed, so a subscriber that sees an event can always read the row it
//! references.

use async_trait::async_trait;
use database::models::{Conversation, LeadQualification, Meeting, Message};
use serde::{Deserialize, Serialize};

/// A server-pushed notification about conversation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ConversationEvent {
    NewMessage(Message),
    MessageDeleted {
        message_id: String,
        conversation_id: String,
    },
    ConversationCreated(Conversation),
    ConversationUpdated(Conversation),
    LeadStageChanged {
        lead: LeadQualification,
        previous_step: String,
    },
    MeetingCreated(Meeting),
    MeetingUpdated(Meeting),
    MeetingCancelled(Meeting),
}

impl ConversationEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ConversationEvent::NewMessage(_) => "new_message",
            ConversationEvent::MessageDeleted { .. } => "message_deleted",
            ConversationEvent::ConversationCreated(_) => "conversation_created",
            ConversationEvent::ConversationUpdated(_) => "conversation_updated",
            ConversationEvent::LeadStageChanged { .. } => "lead_stage_changed",
            ConversationEvent::MeetingCreated(_) => "meeting_created",
            ConversationEvent::MeetingUpdated(_) => "meeting_updated",
            ConversationEvent::MeetingCancelled(_) => "meeting_cancelled",
        }
    }

    /// The conversation this event belongs to, when it has one.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ConversationEvent::NewMessage(m) => Some(&m.conversation_id),
            ConversationEvent::MessageDeleted {
                conversation_id, ..
            } => Some(conversation_id),
            ConversationEvent::ConversationCreated(c)
            | ConversationEvent::ConversationUpdated(c) => Some(&c.id),
            ConversationEvent::LeadStageChanged { lead, .. } => Some(&lead.conversation_id),
            ConversationEvent::MeetingCreated(_)
            | ConversationEvent::MeetingUpdated(_)
            | ConversationEvent::MeetingCancelled(_) => None,
        }
    }

    /// The user this event belongs to, when it has one.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            ConversationEvent::ConversationCreated(c)
            | ConversationEvent::ConversationUpdated(c) => Some(&c.user_id),
            ConversationEvent::LeadStageChanged { lead, .. } => Some(&lead.user_id),
            ConversationEvent::MeetingCreated(m)
            | ConversationEvent::MeetingUpdated(m)
            | ConversationEvent::MeetingCancelled(m) => Some(&m.user_id),
            _ => None,
        }
    }
}

/// Sink for conversation events. The real-time hub implements this; tests
/// use [`RecordingPublisher`].
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event. Must not fail the turn; publishers log and drop on
    /// internal errors.
    async fn publish(&self, event: ConversationEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoOpPublisher;

#[async_trait]
impl EventPublisher for NoOpPublisher {
    async fn publish(&self, _event: ConversationEvent) {}
}

/// Records events for assertions.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: tokio::sync::Mutex<Vec<ConversationEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far.
    pub async fn events(&self) -> Vec<ConversationEvent> {
        self.events.lock().await.clone()
    }

    /// Names of everything published so far.
    pub async fn names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: ConversationEvent) {
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_is_tagged() {
        let event = ConversationEvent::MessageDeleted {
            message_id: "m1".into(),
            conversation_id: "c1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_deleted");
        assert_eq!(json["data"]["message_id"], "m1");
    }
}
