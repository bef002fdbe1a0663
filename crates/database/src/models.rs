//! Database models.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Current UTC time as an RFC3339 string with millisecond precision.
///
/// All timestamps in the store use this format; fixed precision keeps
/// lexicographic and chronological order identical.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a fresh UUID string.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A lead or contact. At least one of `phone`/`email` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub full_name: String,
    pub company: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A conversation with a party on a messaging platform.
///
/// At most one `active` conversation exists per `(platform, external_id)`;
/// the partial unique index in the schema enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    /// "whatsapp" or "web".
    pub platform: String,
    /// Party identifier on the platform (phone number, browser session id).
    pub external_id: String,
    /// "active" or "closed".
    pub status: String,
    /// When false, the agent is muted and an operator replies manually.
    pub agent_enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// A single message in a conversation. Append-only; deletion is a tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// "user", "assistant" or "system".
    pub role: String,
    pub content: String,
    /// "text", "image", "audio" or "video".
    pub message_type: String,
    pub media_url: Option<String>,
    /// Provider message id, unique when present; the idempotency key.
    pub external_id: Option<String>,
    pub read: bool,
    pub deleted: bool,
    /// Set when the outbound send exhausted its retry budget.
    pub delivery_failed: bool,
    pub created_at: String,
}

/// Qualification progress for one (user, conversation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LeadQualification {
    pub id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub consent: bool,
    /// One of the qualification steps; see the `qualification` crate.
    pub current_step: String,
    pub created_at: String,
    pub updated_at: String,
}

/// BANT answers, one row per lead qualification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BantData {
    pub id: String,
    pub lead_qualification_id: String,
    pub budget: Option<String>,
    pub authority: Option<String>,
    pub need: Option<String>,
    pub timeline: Option<String>,
    pub updated_at: String,
}

impl BantData {
    /// All four fields present and non-empty.
    pub fn is_complete(&self) -> bool {
        [&self.budget, &self.authority, &self.need, &self.timeline]
            .iter()
            .all(|f| f.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// Project requirements, one row per lead qualification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Requirements {
    pub id: String,
    pub lead_qualification_id: String,
    pub app_type: Option<String>,
    pub deadline: Option<String>,
}

/// A requested feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Feature {
    pub id: String,
    pub requirement_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// A requested third-party integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Integration {
    pub id: String,
    pub requirement_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Outcome of one agent tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ToolHistoryEntry {
    pub id: String,
    pub conversation_id: String,
    pub lead_qualification_id: Option<String>,
    pub tool_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: String,
}

/// A scheduled meeting, mirrored from the external calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Meeting {
    pub id: String,
    pub user_id: String,
    pub lead_qualification_id: String,
    pub external_meeting_id: Option<String>,
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    /// "scheduled", "completed", "cancelled" or "rescheduled".
    pub status: String,
    pub online_meeting_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Meeting {
    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_rfc3339();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_rfc3339();
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }

    #[test]
    fn bant_completeness() {
        let mut bant = BantData {
            id: new_id(),
            lead_qualification_id: new_id(),
            budget: Some("20k".into()),
            authority: Some("decision maker".into()),
            need: Some("automation".into()),
            timeline: Some("Q3".into()),
            updated_at: now_rfc3339(),
        };
        assert!(bant.is_complete());

        bant.need = Some("  ".into());
        assert!(!bant.is_complete());

        bant.need = None;
        assert!(!bant.is_complete());
    }
}
