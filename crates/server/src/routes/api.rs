//! Legacy REST facade, retained for UI compatibility.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use orchestrator::{ConversationEvent, EventPublisher, InboundText};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversation {
    user_id: String,
    #[serde(default = "default_platform")]
    platform: String,
    external_id: String,
}

fn default_platform() -> String {
    "web".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateMessage {
    conversation_id: String,
    content: String,
    #[serde(default = "default_role")]
    role: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// `GET /api/users`.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Value>> {
    let users = database::user::list_users(state.db.pool()).await?;
    Ok(Json(serde_json::to_value(users).unwrap_or_default()))
}

/// `GET /api/conversations?user_id=...`.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Value>> {
    let pool = state.db.pool();
    let conversations = match query.user_id {
        Some(user_id) => {
            database::conversation::list_user_conversations(pool, &user_id, true).await?
        }
        None => database::conversation::list_conversations(pool).await?,
    };
    Ok(Json(serde_json::to_value(conversations).unwrap_or_default()))
}

/// `POST /api/conversations`.
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversation>,
) -> Result<(StatusCode, Json<Value>)> {
    let conversation = database::conversation::get_or_create_conversation(
        state.db.pool(),
        &body.user_id,
        &body.platform,
        &body.external_id,
    )
    .await?;

    state
        .hub
        .publish(ConversationEvent::ConversationCreated(conversation.clone()))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(conversation).unwrap_or_default()),
    ))
}

/// `GET /api/messages?conversation_id=...` — ascending `(created_at, id)`.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>> {
    let conversation_id = query
        .conversation_id
        .ok_or_else(|| ApiError::Validation("conversation_id query parameter required".into()))?;

    let messages =
        database::message::list_conversation_messages(state.db.pool(), &conversation_id).await?;
    Ok(Json(serde_json::to_value(messages).unwrap_or_default()))
}

/// `POST /api/messages`.
///
/// `role=user` (the default) persists the message and hands it to the
/// orchestrator for an agent turn; `role=assistant` records an operator
/// reply and publishes it without involving the agent.
pub async fn create_message(
    State(state): State<AppState>,
    Json(body): Json<CreateMessage>,
) -> Result<(StatusCode, Json<Value>)> {
    if body.content.trim().is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }

    let pool = state.db.pool();
    // 404 for unknown conversations before any write.
    database::conversation::get_conversation(pool, &body.conversation_id).await?;

    let message = match body.role.as_str() {
        "user" => {
            let appended = database::message::append_message(
                pool,
                &database::message::NewMessage::user_text(
                    &body.conversation_id,
                    &body.content,
                    None,
                ),
            )
            .await?;
            state
                .router
                .dispatch(InboundText::from_persisted(appended.message.clone()))
                .await?;
            appended.message
        }
        "assistant" => {
            let appended = database::message::append_message(
                pool,
                &database::message::NewMessage::assistant_text(
                    &body.conversation_id,
                    &body.content,
                ),
            )
            .await?;
            state
                .hub
                .publish(ConversationEvent::NewMessage(appended.message.clone()))
                .await;
            appended.message
        }
        other => {
            return Err(ApiError::Validation(format!(
                "unsupported role for this endpoint: {other}"
            )));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(message).unwrap_or_default()),
    ))
}
