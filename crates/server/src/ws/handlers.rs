//! Resource request routing.
//!
//! Each request names a resource and a typed action; reads go straight to
//! the store, conversation mutations go through the orchestrator, meeting
//! mutations also touch the calendar. Handlers return plain JSON values;
//! the session layer wraps them in response frames.

use orchestrator::{ConversationEvent, EventPublisher, InboundText};
use qualification::Step;
use serde_json::{json, Value};

use super::protocol::{actions, Resource, ResourceRequest};
use crate::dashboard;
use crate::error::{ApiError, Result};
use crate::state::AppState;

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| ApiError::Validation(format!("bad payload: {e}")))
}

/// Dispatch one resource request for a session.
pub async fn handle(
    state: &AppState,
    client_id: &str,
    request: ResourceRequest,
) -> Result<Value> {
    match request.resource {
        Resource::Users => users(state, parse_payload(request.payload)?).await,
        Resource::Conversations => {
            conversations(state, client_id, parse_payload(request.payload)?).await
        }
        Resource::Messages => messages(state, client_id, parse_payload(request.payload)?).await,
        Resource::Leads => leads(state, parse_payload(request.payload)?).await,
        Resource::Meetings => meetings(state, parse_payload(request.payload)?).await,
        Resource::Requirements => requirements(state, parse_payload(request.payload)?).await,
        Resource::Dashboard => dashboard::execute(state, parse_payload(request.payload)?).await,
    }
}

async fn users(state: &AppState, action: actions::Users) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Users::GetAll => {
            serde_json::to_value(database::user::list_users(pool).await?).unwrap_or_default()
        }
        actions::Users::GetById { id } => {
            serde_json::to_value(database::user::get_user(pool, &id).await?).unwrap_or_default()
        }
    };
    Ok(value)
}

async fn conversations(
    state: &AppState,
    client_id: &str,
    action: actions::Conversations,
) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Conversations::GetAll => {
            serde_json::to_value(database::conversation::list_conversations(pool).await?)
                .unwrap_or_default()
        }
        actions::Conversations::GetById { id } => {
            let conversation = database::conversation::get_conversation(pool, &id).await?;
            // Referencing a conversation subscribes the session to it.
            state.hub.watch_conversation(client_id, &id).await;
            serde_json::to_value(conversation).unwrap_or_default()
        }
        actions::Conversations::Create {
            user_id,
            platform,
            external_id,
        } => {
            let conversation = database::conversation::get_or_create_conversation(
                pool,
                &user_id,
                &platform,
                &external_id,
            )
            .await?;
            state.hub.watch_conversation(client_id, &conversation.id).await;
            state
                .hub
                .publish(ConversationEvent::ConversationCreated(conversation.clone()))
                .await;
            serde_json::to_value(conversation).unwrap_or_default()
        }
        actions::Conversations::Update {
            id,
            agent_enabled,
            status,
        } => {
            let mut conversation = database::conversation::get_conversation(pool, &id).await?;
            if let Some(enabled) = agent_enabled {
                conversation =
                    database::conversation::set_agent_enabled(pool, &id, enabled).await?;
            }
            if status.as_deref() == Some("closed") {
                conversation = database::conversation::close_conversation(pool, &id).await?;
            }
            state
                .hub
                .publish(ConversationEvent::ConversationUpdated(conversation.clone()))
                .await;
            serde_json::to_value(conversation).unwrap_or_default()
        }
    };
    Ok(value)
}

async fn messages(
    state: &AppState,
    client_id: &str,
    action: actions::Messages,
) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Messages::GetAll { conversation_id } => {
            state.hub.watch_conversation(client_id, &conversation_id).await;
            serde_json::to_value(
                database::message::list_conversation_messages(pool, &conversation_id).await?,
            )
            .unwrap_or_default()
        }
        actions::Messages::Create {
            conversation_id,
            content,
        } => {
            // Web-widget user message: persist, then hand to the
            // orchestrator mailbox for the agent turn.
            database::conversation::get_conversation(pool, &conversation_id).await?;
            let appended = database::message::append_message(
                pool,
                &database::message::NewMessage::user_text(&conversation_id, &content, None),
            )
            .await?;
            state
                .router
                .dispatch(InboundText::from_persisted(appended.message.clone()))
                .await?;
            serde_json::to_value(appended.message).unwrap_or_default()
        }
        actions::Messages::Update { conversation_id } => {
            let changed = database::message::mark_messages_read(pool, &conversation_id).await?;
            json!({ "marked_read": changed })
        }
        actions::Messages::Delete { id } => {
            let message = database::message::get_message(pool, &id).await?;
            database::message::delete_message(pool, &id).await?;
            state
                .hub
                .publish(ConversationEvent::MessageDeleted {
                    message_id: id,
                    conversation_id: message.conversation_id,
                })
                .await;
            json!({ "deleted": true })
        }
    };
    Ok(value)
}

async fn leads(state: &AppState, action: actions::Leads) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Leads::GetAll => {
            serde_json::to_value(database::lead::list_leads(pool).await?).unwrap_or_default()
        }
        actions::Leads::GetById { id } => {
            serde_json::to_value(database::lead::get_lead(pool, &id).await?).unwrap_or_default()
        }
        actions::Leads::Update { id, current_step } => {
            let step: Step = current_step
                .parse()
                .map_err(|e: qualification::UnknownStep| ApiError::Validation(e.to_string()))?;
            state
                .router
                .orchestrator()
                .override_stage(&id, step)
                .await?;
            serde_json::to_value(database::lead::get_lead(pool, &id).await?).unwrap_or_default()
        }
    };
    Ok(value)
}

async fn meetings(state: &AppState, action: actions::Meetings) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Meetings::GetAll => {
            serde_json::to_value(database::meeting::list_meetings(pool).await?).unwrap_or_default()
        }
        actions::Meetings::GetById { id } => {
            serde_json::to_value(database::meeting::get_meeting(pool, &id).await?)
                .unwrap_or_default()
        }
        actions::Meetings::Update {
            id,
            status,
            start_time,
            end_time,
        } => {
            let mut meeting = database::meeting::get_meeting(pool, &id).await?;

            if let (Some(start), Some(end)) = (start_time, end_time) {
                let start_utc = chrono::DateTime::parse_from_rfc3339(&start)
                    .map_err(|_| ApiError::Validation("bad start_time".into()))?
                    .to_utc();
                let end_utc = chrono::DateTime::parse_from_rfc3339(&end)
                    .map_err(|_| ApiError::Validation("bad end_time".into()))?
                    .to_utc();
                if let Some(external_id) = &meeting.external_meeting_id {
                    state
                        .calendar
                        .update_event(
                            external_id,
                            graph_calendar::EventPatch::times(start_utc, end_utc),
                        )
                        .await
                        .map_err(|e| ApiError::Internal(e.to_string()))?;
                }
                meeting = database::meeting::reschedule_meeting(pool, &id, &start, &end).await?;
                state
                    .hub
                    .publish(ConversationEvent::MeetingUpdated(meeting.clone()))
                    .await;
            } else if let Some(status) = status {
                meeting = database::meeting::set_meeting_status(pool, &id, &status).await?;
                state
                    .hub
                    .publish(ConversationEvent::MeetingUpdated(meeting.clone()))
                    .await;
            }
            serde_json::to_value(meeting).unwrap_or_default()
        }
        actions::Meetings::Delete { id } => {
            let meeting = database::meeting::get_meeting(pool, &id).await?;
            if let Some(external_id) = &meeting.external_meeting_id {
                state
                    .calendar
                    .cancel_event(external_id)
                    .await
                    .map_err(|e| ApiError::Internal(e.to_string()))?;
            }
            let cancelled = database::meeting::set_meeting_status(pool, &id, "cancelled").await?;
            state
                .hub
                .publish(ConversationEvent::MeetingCancelled(cancelled.clone()))
                .await;
            serde_json::to_value(cancelled).unwrap_or_default()
        }
    };
    Ok(value)
}

async fn requirements(state: &AppState, action: actions::Requirements) -> Result<Value> {
    let pool = state.db.pool();
    let value = match action {
        actions::Requirements::GetAll => {
            let leads = database::lead::list_leads(pool).await?;
            let mut all = Vec::new();
            for lead in leads {
                if let Some(req) = database::requirements::get_requirements(pool, &lead.id).await? {
                    all.push(requirement_view(state, req).await?);
                }
            }
            Value::Array(all)
        }
        actions::Requirements::GetById {
            lead_qualification_id,
        } => {
            let req = database::requirements::get_requirements(pool, &lead_qualification_id)
                .await?
                .ok_or(ApiError::Database(database::DatabaseError::NotFound {
                    entity: "Requirements",
                    id: lead_qualification_id,
                }))?;
            requirement_view(state, req).await?
        }
    };
    Ok(value)
}

/// A requirements row joined with its features and integrations.
async fn requirement_view(
    state: &AppState,
    req: database::models::Requirements,
) -> Result<Value> {
    let pool = state.db.pool();
    let features = database::requirements::list_features(pool, &req.id).await?;
    let integrations = database::requirements::list_integrations(pool, &req.id).await?;
    Ok(json!({
        "id": req.id,
        "lead_qualification_id": req.lead_qualification_id,
        "app_type": req.app_type,
        "deadline": req.deadline,
        "features": features,
        "integrations": integrations,
    }))
}
