//! Keyed per-conversation mailboxes.
//!
//! Each conversation gets a single-consumer queue whose consumer task is
//! spawned on demand and torn down after an idle interval. Arrivals for a
//! busy conversation queue in FIFO order; distinct conversations advance in
//! parallel. This is how the at-most-one-in-flight-advance-per-conversation
//! invariant is enforced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use crate::error::OrchestratorError;
use crate::orchestrator::{InboundText, Orchestrator};

/// Queue capacity per conversation before dispatch applies backpressure.
const MAILBOX_CAPACITY: usize = 64;
/// Consumer tasks exit after this long without work.
const IDLE_TEARDOWN: Duration = Duration::from_secs(300);

/// Routes inbound messages into per-conversation consumer tasks.
#[derive(Clone)]
pub struct ConversationRouter {
    orchestrator: Arc<Orchestrator>,
    mailboxes: Arc<Mutex<HashMap<String, mpsc::Sender<InboundText>>>>,
}

impl ConversationRouter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Access to the orchestrator for non-turn operations.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Enqueue an inbound message for its conversation, spawning the
    /// consumer if none is running. Waits for queue space when the
    /// conversation is flooded.
    pub async fn dispatch(&self, inbound: InboundText) -> Result<(), OrchestratorError> {
        let conversation_id = inbound.conversation_id.clone();

        let sender = {
            let mut mailboxes = self.mailboxes.lock().await;
            match mailboxes.get(&conversation_id) {
                // A consumer may have torn itself down between our lookup
                // and the send; the closed-channel path below recovers.
                Some(sender) => sender.clone(),
                None => {
                    let sender = self.spawn_consumer(&conversation_id);
                    mailboxes.insert(conversation_id.clone(), sender.clone());
                    sender
                }
            }
        };

        match sender.send(inbound).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(inbound)) => {
                // The idle consumer exited; replace it and retry once.
                let sender = {
                    let mut mailboxes = self.mailboxes.lock().await;
                    let sender = self.spawn_consumer(&conversation_id);
                    mailboxes.insert(conversation_id.clone(), sender.clone());
                    sender
                };
                sender
                    .send(inbound)
                    .await
                    .map_err(|_| OrchestratorError::MailboxClosed)
            }
        }
    }

    fn spawn_consumer(&self, conversation_id: &str) -> mpsc::Sender<InboundText> {
        let (tx, mut rx) = mpsc::channel::<InboundText>(MAILBOX_CAPACITY);
        let orchestrator = self.orchestrator.clone();
        let mailboxes = self.mailboxes.clone();
        let key = conversation_id.to_string();

        debug!(conversation = %key, "spawning mailbox consumer");
        tokio::spawn(async move {
            loop {
                let inbound = match tokio::time::timeout(IDLE_TEARDOWN, rx.recv()).await {
                    Ok(Some(inbound)) => inbound,
                    // Channel closed or idle long enough; tear down.
                    Ok(None) | Err(_) => break,
                };

                if let Err(e) = orchestrator.process_inbound(inbound).await {
                    // A failed turn must not kill the consumer; later
                    // messages still need processing.
                    error!(conversation = %key, error = %e, "turn failed");
                }
            }

            debug!(conversation = %key, "mailbox consumer exiting");
            let mut mailboxes = mailboxes.lock().await;
            // Only remove our own entry; dispatch may already have replaced it.
            if mailboxes.get(&key).is_some_and(|s| s.is_closed()) {
                mailboxes.remove(&key);
            }
        });

        tx
    }

    /// Number of live mailboxes, for the dashboard's in-flight metric.
    pub async fn active_count(&self) -> usize {
        self.mailboxes.lock().await.len()
    }
}
