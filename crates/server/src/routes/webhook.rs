//! Messaging provider webhook.
//!
//! `GET /webhook` answers the subscription handshake; `POST /webhook`
//! verifies the payload signature, durably persists every message fragment,
//! enqueues the fragments for the orchestrator, and only then returns 200.
//! Anything unparseable after the signature check still gets a 200 — the
//! provider treats non-2xx as retriable and a malformed payload will never
//! get better.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use orchestrator::{ConversationEvent, EventPublisher, InboundText};
use serde::Deserialize;
use tracing::{info, warn};
use whatsapp_cloud::signature::verify_signature;
use whatsapp_cloud::{InboundFragment, WebhookPayload};

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const PLATFORM: &str = "whatsapp";

/// Subscription handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode", default)]
    mode: String,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: String,
    #[serde(rename = "hub.challenge", default)]
    challenge: String,
}

/// `GET /webhook` — echo the challenge iff the verify token matches.
pub async fn subscribe(
    Query(query): Query<HandshakeQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if query.mode == "subscribe" && query.verify_token == state.webhook.verify_token {
        info!("webhook subscription handshake accepted");
        (StatusCode::OK, query.challenge)
    } else {
        warn!("webhook subscription handshake rejected");
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// `POST /webhook` — signed provider callbacks.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if verify_signature(&state.webhook.app_secret, signature, &body).is_err() {
        warn!("webhook signature rejected");
        return StatusCode::FORBIDDEN;
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // Acknowledged anyway; a retry cannot fix a malformed body.
            warn!(error = %e, "unparseable webhook payload acknowledged");
            return StatusCode::OK;
        }
    };

    for fragment in payload.fragments() {
        if let Err(e) = ingest_fragment(&state, fragment).await {
            // The fragment is either persisted or unprocessable; the
            // response stays 200 so the provider does not storm us.
            warn!(error = %e, "webhook fragment failed");
        }
    }

    StatusCode::OK
}

/// Resolve the party, persist the message durably, then enqueue the turn.
async fn ingest_fragment(
    state: &AppState,
    fragment: InboundFragment,
) -> Result<(), crate::error::ApiError> {
    let pool = state.db.pool();

    let existing =
        database::conversation::get_active_conversation(pool, PLATFORM, &fragment.sender).await?;

    let (_user, conversation, _lead) =
        database::intake::upsert_user_and_open_conversation(pool, PLATFORM, &fragment.sender)
            .await?;

    if existing.is_none() {
        state
            .hub
            .publish(ConversationEvent::ConversationCreated(conversation.clone()))
            .await;
    }

    let appended = database::message::append_message(
        pool,
        &database::message::NewMessage {
            conversation_id: conversation.id.clone(),
            role: "user".to_string(),
            content: fragment.content.clone(),
            message_type: fragment.message_type.clone(),
            media_url: None,
            external_id: Some(fragment.external_id.clone()),
        },
    )
    .await?;

    if appended.duplicate {
        info!(external_id = %fragment.external_id, "duplicate webhook fragment dropped");
        return Ok(());
    }

    // The row is durable; hand the turn to the conversation's mailbox.
    state
        .router
        .dispatch(InboundText::from_persisted(appended.message))
        .await?;

    Ok(())
}
