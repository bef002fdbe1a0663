//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use database::Database;
use graph_calendar::CalendarApi;
use orchestrator::ConversationRouter;

use crate::ws::hub::Hub;

/// Secrets the webhook endpoint verifies against.
#[derive(Debug, Clone)]
pub struct WebhookSecrets {
    /// Token echoed during the subscription handshake.
    pub verify_token: String,
    /// App secret for `X-Hub-Signature-256` checks.
    pub app_secret: String,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Store handle for read paths.
    pub db: Database,
    /// Per-conversation dispatch into the orchestrator.
    pub router: ConversationRouter,
    /// Real-time session hub.
    pub hub: Arc<Hub>,
    /// Calendar client, for operator meeting mutations.
    pub calendar: Arc<dyn CalendarApi>,
    /// Webhook verification secrets.
    pub webhook: WebhookSecrets,
    /// Session token secret.
    pub service_key: Option<String>,
    /// Process start, for uptime reporting.
    pub started: Instant,
}
