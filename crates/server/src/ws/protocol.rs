//! Real-time session protocol frames.
//!
//! Every frame is a JSON object with `type`, a correlation `id`, and a
//! payload. Requests name a resource and a typed action; unknown resources,
//! actions, or payload shapes are rejected at deserialization instead of
//! being passed through.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Request {
        id: String,
        #[serde(flatten)]
        request: ResourceRequest,
    },
    Heartbeat {
        #[serde(default)]
        id: Option<String>,
    },
}

/// A request against a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRequest {
    pub resource: Resource,
    pub payload: Value,
}

/// The resources the hub serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Users,
    Conversations,
    Messages,
    Leads,
    Meetings,
    Requirements,
    Dashboard,
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        id: String,
        payload: ConnectedPayload,
    },
    Response {
        id: String,
        payload: Value,
    },
    Error {
        id: String,
        payload: ErrorPayload,
    },
    Event {
        id: String,
        payload: EventPayload,
    },
    Heartbeat {
        id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPayload {
    pub client_id: String,
    pub user_id: Option<String>,
    pub authenticated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// An event as delivered to subscribers: `{type: <name>, data: <payload>}`.
#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

/// Typed action payloads, one enum per resource.
pub mod actions {
    use super::*;

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Users {
        GetAll,
        GetById { id: String },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Conversations {
        GetAll,
        GetById {
            id: String,
        },
        Create {
            user_id: String,
            platform: String,
            external_id: String,
        },
        Update {
            id: String,
            #[serde(default)]
            agent_enabled: Option<bool>,
            #[serde(default)]
            status: Option<String>,
        },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Messages {
        GetAll {
            conversation_id: String,
        },
        Create {
            conversation_id: String,
            content: String,
        },
        /// Mark every user message of the conversation read.
        Update {
            conversation_id: String,
        },
        Delete {
            id: String,
        },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Leads {
        GetAll,
        GetById {
            id: String,
        },
        /// Operator stage override.
        Update {
            id: String,
            current_step: String,
        },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Meetings {
        GetAll,
        GetById {
            id: String,
        },
        Update {
            id: String,
            #[serde(default)]
            status: Option<String>,
            #[serde(default)]
            start_time: Option<String>,
            #[serde(default)]
            end_time: Option<String>,
        },
        /// Cancel locally and on the provider calendar.
        Delete {
            id: String,
        },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Requirements {
        GetAll,
        GetById { lead_qualification_id: String },
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(tag = "action", rename_all = "snake_case")]
    pub enum Dashboard {
        GetDashboardStats,
        GetConversionFunnel,
        GetActivityTimeline {
            from: String,
            to: String,
        },
        GetAgentPerformance {
            #[serde(default)]
            since: Option<String>,
        },
        GetRealTimeMetrics,
        GetLeadPipeline,
        GetConversionStats,
        GetAbandonedLeads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_round_trip() {
        let raw = r#"{
            "type": "request",
            "id": "req-1",
            "resource": "conversations",
            "payload": {"action": "update", "id": "c1", "agent_enabled": false}
        }"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        let ClientFrame::Request { id, request } = frame else {
            panic!("expected request");
        };
        assert_eq!(id, "req-1");
        assert_eq!(request.resource, Resource::Conversations);

        let action: actions::Conversations = serde_json::from_value(request.payload).unwrap();
        assert!(matches!(
            action,
            actions::Conversations::Update {
                agent_enabled: Some(false),
                ..
            }
        ));
    }

    #[test]
    fn unknown_resource_is_rejected() {
        let raw = r#"{"type": "request", "id": "r", "resource": "wallets", "payload": {}}"#;
        assert!(serde_json::from_str::<ClientFrame>(raw).is_err());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let payload = serde_json::json!({"action": "explode", "id": "x"});
        assert!(serde_json::from_value::<actions::Users>(payload).is_err());
    }

    #[test]
    fn event_frames_carry_name_and_data() {
        let frame = ServerFrame::Event {
            id: "evt-1".into(),
            payload: EventPayload {
                event_type: "new_message".into(),
                data: serde_json::json!({"id": "m1"}),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["payload"]["type"], "new_message");
    }
}
