//! The immutable result of one agent advance.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

/// A structured side-effect request from the agent.
///
/// Tool calls arrive from the model as `(name, json arguments)` pairs and are
/// parsed into variants here, at the boundary; unknown names and malformed
/// arguments are rejected instead of being passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
    RecordConsent {
        consent: bool,
    },
    RecordPersonalData {
        full_name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
        company: Option<String>,
    },
    RecordBant {
        budget: Option<String>,
        authority: Option<String>,
        need: Option<String>,
        timeline: Option<String>,
    },
    RecordRequirements {
        app_type: Option<String>,
        deadline: Option<String>,
        #[serde(default)]
        features: Vec<String>,
        #[serde(default)]
        integrations: Vec<String>,
    },
    GetAvailableSlots {
        /// `YYYY-MM-DD`.
        date: String,
        /// Slot length in minutes.
        #[serde(default = "default_duration")]
        duration_minutes: u32,
    },
    ScheduleMeeting {
        /// RFC3339 start.
        start: String,
        /// RFC3339 end.
        end: String,
        subject: String,
        attendee_email: String,
    },
    RescheduleMeeting {
        meeting_id: String,
        new_start: String,
        new_end: String,
    },
    CancelMeeting {
        meeting_id: String,
    },
    EndConversation {
        reason: String,
    },
}

fn default_duration() -> u32 {
    60
}

impl ToolInvocation {
    /// The wire name of this tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::RecordConsent { .. } => "record_consent",
            ToolInvocation::RecordPersonalData { .. } => "record_personal_data",
            ToolInvocation::RecordBant { .. } => "record_bant",
            ToolInvocation::RecordRequirements { .. } => "record_requirements",
            ToolInvocation::GetAvailableSlots { .. } => "get_available_slots",
            ToolInvocation::ScheduleMeeting { .. } => "schedule_meeting",
            ToolInvocation::RescheduleMeeting { .. } => "reschedule_meeting",
            ToolInvocation::CancelMeeting { .. } => "cancel_meeting",
            ToolInvocation::EndConversation { .. } => "end_conversation",
        }
    }

    /// Parse a model-issued call. Unknown tool names and malformed argument
    /// payloads are errors.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, AgentError> {
        let args: Value = serde_json::from_str(arguments)
            .map_err(|e| AgentError::ProcessingFailed(format!("bad tool arguments: {e}")))?;

        let tagged = match args {
            Value::Object(mut map) => {
                map.insert("tool".to_string(), Value::String(name.to_string()));
                Value::Object(map)
            }
            _ => {
                return Err(AgentError::ProcessingFailed(format!(
                    "tool arguments for {name} must be an object"
                )))
            }
        };

        serde_json::from_value(tagged)
            .map_err(|e| AgentError::ProcessingFailed(format!("unknown or invalid tool call {name}: {e}")))
    }
}

/// One advance of the agent: optional user-facing text plus the ordered tool
/// invocations to apply. The orchestrator applies effects and recomputes the
/// stage; the turn itself never mutates anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Text to send to the user; empty means no reply this turn.
    pub assistant_text: String,
    /// Tool invocations in the order the model issued them.
    pub tool_invocations: Vec<ToolInvocation>,
}

impl Turn {
    /// A plain text reply with no side effects.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            assistant_text: content.into(),
            tool_invocations: Vec::new(),
        }
    }

    /// Attach a tool invocation.
    pub fn with_tool(mut self, tool: ToolInvocation) -> Self {
        self.tool_invocations.push(tool);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tools() {
        let tool = ToolInvocation::parse("record_consent", r#"{"consent": true}"#).unwrap();
        assert_eq!(tool, ToolInvocation::RecordConsent { consent: true });

        let tool = ToolInvocation::parse(
            "schedule_meeting",
            r#"{"start": "2026-06-03T09:00:00Z", "end": "2026-06-03T10:00:00Z",
                "subject": "Discovery call", "attendee_email": "ana@acme.io"}"#,
        )
        .unwrap();
        assert_eq!(tool.name(), "schedule_meeting");
    }

    #[test]
    fn defaults_slot_duration() {
        let tool =
            ToolInvocation::parse("get_available_slots", r#"{"date": "2026-06-03"}"#).unwrap();
        assert_eq!(
            tool,
            ToolInvocation::GetAvailableSlots {
                date: "2026-06-03".into(),
                duration_minutes: 60
            }
        );
    }

    #[test]
    fn rejects_unknown_tools() {
        let err = ToolInvocation::parse("drop_database", "{}").unwrap_err();
        assert!(matches!(err, AgentError::ProcessingFailed(_)));
    }

    #[test]
    fn rejects_non_object_arguments() {
        let err = ToolInvocation::parse("record_consent", "[1,2]").unwrap_err();
        assert!(matches!(err, AgentError::ProcessingFailed(_)));
    }

    #[test]
    fn turn_builder() {
        let turn = Turn::text("hello").with_tool(ToolInvocation::RecordConsent { consent: true });
        assert_eq!(turn.assistant_text, "hello");
        assert_eq!(turn.tool_invocations.len(), 1);
    }
}
