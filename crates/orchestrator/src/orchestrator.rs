//! The conversation turn protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{catalogue_for, AdvanceRequest, Agent, ChatEntry, Window};
use chrono::Utc;
use database::{models::Message, Database};
use graph_calendar::{CalendarApi, SlotRules};
use qualification::{next_step, Step};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::effects::{apply_batch, EffectContext};
use crate::error::OrchestratorError;
use crate::events::{ConversationEvent, EventPublisher};
use crate::sender::{ReplySender, SendError};
use crate::view::{lead_view, TurnSignals};

/// Reply sent when the agent itself fails or times out.
pub const FALLBACK_APOLOGY: &str =
    "Sorry, something went wrong on my side. Could you say that again?";

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Non-system entries in the agent's history window.
    pub history_window: u32,
    /// Deadline for a single agent advance.
    pub agent_timeout: Duration,
    /// System preamble handed to the agent.
    pub preamble: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_window: 10,
            agent_timeout: Duration::from_secs(60),
            preamble: llm_default_preamble(),
        }
    }
}

fn llm_default_preamble() -> String {
    // Kept here rather than in llm-agent so every Agent implementation gets
    // the same instructions.
    "You are a lead-qualification assistant for a software development \
     company. Guide the user through consent, personal details, BANT \
     qualification, project requirements, and meeting scheduling, recording \
     data with the available tools. Be friendly, professional and concise."
        .to_string()
}

/// An inbound user message, already resolved to a conversation.
#[derive(Debug, Clone)]
pub struct InboundText {
    pub conversation_id: String,
    pub content: String,
    pub message_type: String,
    pub media_url: Option<String>,
    /// Provider message id; enables idempotent intake.
    pub external_id: Option<String>,
    /// Set when the ingest already persisted the row durably (the webhook
    /// must do so before acknowledging); the turn then skips its own append.
    pub persisted: Option<Message>,
}

impl InboundText {
    pub fn text(conversation_id: &str, content: &str, external_id: Option<&str>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            media_url: None,
            external_id: external_id.map(str::to_string),
            persisted: None,
        }
    }

    /// Wrap a message row the ingest already wrote.
    pub fn from_persisted(message: Message) -> Self {
        Self {
            conversation_id: message.conversation_id.clone(),
            content: message.content.clone(),
            message_type: message.message_type.clone(),
            media_url: message.media_url.clone(),
            external_id: message.external_id.clone(),
            persisted: Some(message),
        }
    }
}

/// What one turn did, for callers and tests.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    /// The inbound message was a duplicate and nothing happened.
    pub duplicate: bool,
    /// The agent was muted; only the inbound message was persisted.
    pub agent_muted: bool,
    /// The persisted assistant reply, when one was produced.
    pub reply: Option<Message>,
    /// Stage after the turn.
    pub stage: Step,
}

/// Coordinates one conversation turn end to end.
///
/// Cloneable handles are shared by the mailbox consumers; all mutable state
/// lives in the store, except the consecutive-refusal counters which are
/// in-process (the per-conversation serialization makes them safe).
pub struct Orchestrator {
    db: Database,
    agent: Arc<dyn Agent>,
    calendar: Arc<dyn CalendarApi>,
    sender: Arc<dyn ReplySender>,
    publisher: Arc<dyn EventPublisher>,
    rules: SlotRules,
    config: OrchestratorConfig,
    refusals: Mutex<HashMap<String, u32>>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        agent: Arc<dyn Agent>,
        calendar: Arc<dyn CalendarApi>,
        sender: Arc<dyn ReplySender>,
        publisher: Arc<dyn EventPublisher>,
        rules: SlotRules,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            agent,
            calendar,
            sender,
            publisher,
            rules,
            config,
            refusals: Mutex::new(HashMap::new()),
        }
    }

    /// Access to the store, for the server's read paths.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Process one inbound user message through the full turn protocol.
    pub async fn process_inbound(
        &self,
        inbound: InboundText,
    ) -> Result<TurnReport, OrchestratorError> {
        let pool = self.db.pool();

        // 1. Persist the inbound message; duplicates drop out here. When the
        // ingest already wrote the row (webhook path), reuse it.
        let inbound_message = match inbound.persisted {
            Some(message) => message,
            None => {
                let appended = database::message::append_message(
                    pool,
                    &database::message::NewMessage {
                        conversation_id: inbound.conversation_id.clone(),
                        role: "user".to_string(),
                        content: inbound.content.clone(),
                        message_type: inbound.message_type.clone(),
                        media_url: inbound.media_url.clone(),
                        external_id: inbound.external_id.clone(),
                    },
                )
                .await?;

                if appended.duplicate {
                    info!(
                        external_id = ?inbound.external_id,
                        "duplicate inbound message dropped"
                    );
                    return Ok(TurnReport {
                        duplicate: true,
                        ..Default::default()
                    });
                }
                appended.message
            }
        };

        let conversation =
            database::conversation::get_conversation(pool, &inbound.conversation_id).await?;
        database::conversation::touch_conversation(pool, &conversation.id).await?;

        self.publisher
            .publish(ConversationEvent::NewMessage(inbound_message.clone()))
            .await;

        // 2. Load the lead.
        let lead = database::lead::get_or_create_lead(
            pool,
            &conversation.user_id,
            &conversation.id,
        )
        .await?;
        let stage: Step = lead.current_step.parse().unwrap_or(Step::Start);

        // 3. Operator takeover: no agent involvement.
        if !conversation.agent_enabled {
            info!(conversation = %conversation.id, "agent muted; skipping advance");
            return Ok(TurnReport {
                agent_muted: true,
                stage,
                ..Default::default()
            });
        }

        // 4. Advance the agent over the bounded window, under its deadline.
        let history =
            database::message::history_window(pool, &conversation.id, self.config.history_window)
                .await?;
        let entries: Vec<ChatEntry> = history
            .iter()
            .map(|m| ChatEntry {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();
        let request = AdvanceRequest {
            window: Window::build(
                self.config.preamble.clone(),
                &entries,
                self.config.history_window as usize,
            ),
            stage,
            tools: catalogue_for(stage),
        };

        let turn = match tokio::time::timeout(
            self.config.agent_timeout,
            self.agent.advance(request),
        )
        .await
        {
            Ok(Ok(turn)) => turn,
            Ok(Err(e)) => {
                warn!(error = %e, "agent failed; sending fallback");
                agent_core::Turn::text(FALLBACK_APOLOGY)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.agent_timeout.as_secs(),
                    "agent timed out; sending fallback"
                );
                agent_core::Turn::text(FALLBACK_APOLOGY)
            }
        };

        // 5. Apply tool effects in order.
        let ctx = EffectContext {
            db: &self.db,
            calendar: self.calendar.as_ref(),
            rules: &self.rules,
            lead_id: &lead.id,
            user_id: &conversation.user_id,
            conversation_id: &conversation.id,
            now: Utc::now(),
        };
        let effects = apply_batch(&ctx, &turn.tool_invocations).await?;

        // 6. Recompute the stage from post-effect state.
        let refusal_count = {
            let mut refusals = self.refusals.lock().await;
            if effects.consent_given {
                refusals.remove(&lead.id);
                0
            } else if effects.consent_refused {
                let count = refusals.entry(lead.id.clone()).or_insert(0);
                *count += 1;
                *count
            } else {
                refusals.get(&lead.id).copied().unwrap_or(0)
            }
        };

        let lead = database::lead::get_lead(pool, &lead.id).await?;
        let signals = TurnSignals {
            consent_refused: effects.consent_refused,
            refusal_count,
            declined: effects.declined,
        };
        let view = lead_view(&self.db, &lead, signals, Utc::now()).await?;
        let new_stage = next_step(&view);

        let lead = if new_stage != stage {
            let previous = lead.current_step.clone();
            let updated = database::lead::set_current_step(pool, &lead.id, new_stage).await?;
            self.publisher
                .publish(ConversationEvent::LeadStageChanged {
                    lead: updated.clone(),
                    previous_step: previous,
                })
                .await;
            updated
        } else {
            lead
        };

        // 7. Compose and dispatch the reply.
        let mut reply_text = turn.assistant_text.trim().to_string();
        for extra in &effects.appended_text {
            if !reply_text.is_empty() {
                reply_text.push_str("\n\n");
            }
            reply_text.push_str(extra);
        }
        if let Some(note) = &effects.failure_note {
            if !reply_text.is_empty() {
                reply_text.push_str("\n\n");
            }
            reply_text.push_str(note);
        }

        let reply = if reply_text.is_empty() {
            None
        } else {
            let appended = database::message::append_message(
                pool,
                &database::message::NewMessage::assistant_text(&conversation.id, &reply_text),
            )
            .await?;
            let mut message = appended.message;

            // Web conversations are delivered through the real-time hub's
            // new_message event; only provider-backed platforms dispatch.
            if conversation.platform != "web" {
                match self.sender.send_text(&conversation.external_id, &reply_text).await {
                    Ok(provider_id) if !provider_id.is_empty() => {
                        database::message::set_external_id(pool, &message.id, &provider_id)
                            .await?;
                        message.external_id = Some(provider_id);
                    }
                    Ok(_) => {}
                    Err(SendError::Permanent(e)) => {
                        warn!(error = %e, "reply delivery failed permanently");
                        database::message::mark_delivery_failed(pool, &message.id).await?;
                        message.delivery_failed = true;
                    }
                    Err(SendError::Transient(e)) => {
                        warn!(error = %e, "reply delivery failed transiently");
                    }
                }
            }

            self.publisher
                .publish(ConversationEvent::NewMessage(message.clone()))
                .await;
            Some(message)
        };

        // 8. Remaining events: effect events, then the conversation update.
        for event in effects.events {
            self.publisher.publish(event).await;
        }
        let conversation = database::conversation::get_conversation(pool, &conversation.id).await?;
        self.publisher
            .publish(ConversationEvent::ConversationUpdated(conversation))
            .await;

        Ok(TurnReport {
            duplicate: false,
            agent_muted: false,
            reply,
            stage: new_stage,
        })
    }

    /// Operator override: set a lead's stage to any value, bypassing the
    /// forward-only rule, and publish the change.
    pub async fn override_stage(
        &self,
        lead_id: &str,
        step: Step,
    ) -> Result<(), OrchestratorError> {
        let before = database::lead::get_lead(self.db.pool(), lead_id).await?;
        if !qualification::is_forward(
            before.current_step.parse().unwrap_or(Step::Start),
            step,
        ) {
            info!(lead = %lead_id, from = %before.current_step, to = %step, "operator backward override");
        }
        let updated = database::lead::set_current_step(self.db.pool(), lead_id, step).await?;
        self.publisher
            .publish(ConversationEvent::LeadStageChanged {
                lead: updated,
                previous_step: before.current_step,
            })
            .await;
        Ok(())
    }
}
