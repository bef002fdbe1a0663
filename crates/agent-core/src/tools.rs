//! Tool catalogue definitions.
//!
//! Each definition carries the JSON schema the model sees. The catalogue is
//! gated by qualification stage: tools that make no sense at the current
//! stage are simply not offered, which keeps the model from calling them.

use qualification::Step;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An OpenAI-style function tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Function name, description and parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl ToolDefinition {
    fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: Some(description.to_string()),
                parameters,
            },
        }
    }

    pub fn record_consent() -> Self {
        Self::function(
            "record_consent",
            "Record whether the user accepted data-processing consent. \
             Call with consent=false when the user explicitly refuses.",
            json!({
                "type": "object",
                "properties": {
                    "consent": { "type": "boolean" }
                },
                "required": ["consent"]
            }),
        )
    }

    pub fn record_personal_data() -> Self {
        Self::function(
            "record_personal_data",
            "Store the user's personal details as they are provided. \
             Only include fields the user actually stated.",
            json!({
                "type": "object",
                "properties": {
                    "full_name": { "type": "string" },
                    "email": { "type": "string" },
                    "phone": { "type": "string" },
                    "company": { "type": "string" }
                }
            }),
        )
    }

    pub fn record_bant() -> Self {
        Self::function(
            "record_bant",
            "Store BANT qualification answers (budget, authority, need, \
             timeline). Include only the fields answered in this message.",
            json!({
                "type": "object",
                "properties": {
                    "budget": { "type": "string" },
                    "authority": { "type": "string" },
                    "need": { "type": "string" },
                    "timeline": { "type": "string" }
                }
            }),
        )
    }

    pub fn record_requirements() -> Self {
        Self::function(
            "record_requirements",
            "Store project requirements: application type, deadline, and the \
             features and integrations the user listed.",
            json!({
                "type": "object",
                "properties": {
                    "app_type": { "type": "string" },
                    "deadline": { "type": "string" },
                    "features": { "type": "array", "items": { "type": "string" } },
                    "integrations": { "type": "array", "items": { "type": "string" } }
                }
            }),
        )
    }

    pub fn get_available_slots() -> Self {
        Self::function(
            "get_available_slots",
            "List free meeting slots on a date. Use before proposing times.",
            json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "YYYY-MM-DD" },
                    "duration_minutes": { "type": "integer", "default": 60 }
                },
                "required": ["date"]
            }),
        )
    }

    pub fn schedule_meeting() -> Self {
        Self::function(
            "schedule_meeting",
            "Book a meeting at a slot the user accepted. Times are RFC3339 UTC.",
            json!({
                "type": "object",
                "properties": {
                    "start": { "type": "string" },
                    "end": { "type": "string" },
                    "subject": { "type": "string" },
                    "attendee_email": { "type": "string" }
                },
                "required": ["start", "end", "subject", "attendee_email"]
            }),
        )
    }

    pub fn reschedule_meeting() -> Self {
        Self::function(
            "reschedule_meeting",
            "Move an existing meeting to new times the user accepted.",
            json!({
                "type": "object",
                "properties": {
                    "meeting_id": { "type": "string" },
                    "new_start": { "type": "string" },
                    "new_end": { "type": "string" }
                },
                "required": ["meeting_id", "new_start", "new_end"]
            }),
        )
    }

    pub fn cancel_meeting() -> Self {
        Self::function(
            "cancel_meeting",
            "Cancel an existing meeting at the user's request.",
            json!({
                "type": "object",
                "properties": {
                    "meeting_id": { "type": "string" }
                },
                "required": ["meeting_id"]
            }),
        )
    }

    pub fn end_conversation() -> Self {
        Self::function(
            "end_conversation",
            "End the conversation. Use reason \"user_declined\" when the user \
             does not want to continue.",
            json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string" }
                },
                "required": ["reason"]
            }),
        )
    }
}

/// The tools valid at a given qualification stage.
///
/// `end_conversation` is always available; data-recording tools appear from
/// their stage onward so a single rich message can still fill later stages;
/// scheduling tools only open up once requirements are underway.
pub fn catalogue_for(step: Step) -> Vec<ToolDefinition> {
    let mut tools = vec![ToolDefinition::end_conversation()];

    match step {
        Step::Start | Step::Consent => {
            tools.push(ToolDefinition::record_consent());
        }
        Step::PersonalData => {
            tools.push(ToolDefinition::record_personal_data());
        }
        Step::Bant => {
            tools.push(ToolDefinition::record_personal_data());
            tools.push(ToolDefinition::record_bant());
        }
        Step::Requirements => {
            tools.push(ToolDefinition::record_bant());
            tools.push(ToolDefinition::record_requirements());
        }
        Step::Meeting => {
            tools.push(ToolDefinition::record_requirements());
            tools.push(ToolDefinition::get_available_slots());
            tools.push(ToolDefinition::schedule_meeting());
            tools.push(ToolDefinition::reschedule_meeting());
            tools.push(ToolDefinition::cancel_meeting());
        }
        Step::Completed => {
            tools.push(ToolDefinition::get_available_slots());
            tools.push(ToolDefinition::reschedule_meeting());
            tools.push(ToolDefinition::cancel_meeting());
        }
        Step::Abandoned => {}
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(step: Step) -> Vec<String> {
        catalogue_for(step)
            .into_iter()
            .map(|t| t.function.name)
            .collect()
    }

    #[test]
    fn consent_stage_cannot_schedule() {
        let names = names(Step::Consent);
        assert!(names.contains(&"record_consent".to_string()));
        assert!(!names.contains(&"schedule_meeting".to_string()));
        assert!(!names.contains(&"record_bant".to_string()));
    }

    #[test]
    fn meeting_stage_offers_scheduling() {
        let names = names(Step::Meeting);
        assert!(names.contains(&"get_available_slots".to_string()));
        assert!(names.contains(&"schedule_meeting".to_string()));
        assert!(!names.contains(&"record_consent".to_string()));
    }

    #[test]
    fn end_conversation_is_always_offered_while_live() {
        for step in [Step::Start, Step::Bant, Step::Meeting, Step::Completed] {
            assert!(names(step).contains(&"end_conversation".to_string()));
        }
    }

    #[test]
    fn definitions_serialize_as_function_tools() {
        let json = serde_json::to_value(ToolDefinition::record_bant()).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "record_bant");
        assert!(json["function"]["parameters"]["properties"]["budget"].is_object());
    }
}
