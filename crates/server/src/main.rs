//! Lead-qualification service entry point.
//!
//! Wires the process root: store, messaging and calendar clients, the LLM
//! agent, the conversation orchestrator with its keyed mailboxes, the
//! real-time hub, the abandonment sweep, and the HTTP server.

use std::sync::Arc;
use std::time::Instant;

use database::Database;
use graph_calendar::{CalendarConfig, GraphCalendarClient, SlotRules};
use llm_agent::LlmAgent;
use orchestrator::{
    ConversationRouter, EventPublisher, Orchestrator, OrchestratorConfig, WhatsAppSender,
};
use server::ws::hub::Hub;
use server::{config, routes, AppState, WebhookSecrets};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use whatsapp_cloud::{WhatsAppClient, WhatsAppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env()?;
    info!(addr = %config.addr, "starting lead-qualification server");

    // Store.
    let db = Database::connect(&config.store_url).await?;
    db.migrate().await?;

    // Messaging client.
    let whatsapp_config = WhatsAppConfig::from_env()?;
    let webhook = WebhookSecrets {
        verify_token: whatsapp_config.verify_token.clone(),
        app_secret: whatsapp_config.app_secret.clone(),
    };
    let whatsapp = WhatsAppClient::new(whatsapp_config)?;

    // Calendar client and scheduling rules.
    let calendar_config = CalendarConfig::from_env()?;
    let rules = SlotRules::new(
        calendar_config.timezone,
        calendar_config.work_start_hour,
        calendar_config.work_end_hour,
    );
    let calendar = Arc::new(GraphCalendarClient::new(calendar_config)?);

    // Agent runtime.
    let agent = Arc::new(LlmAgent::from_env()?);

    // Real-time hub doubles as the orchestrator's event publisher.
    let hub = Arc::new(Hub::new());

    let orch = Arc::new(Orchestrator::new(
        db.clone(),
        agent,
        calendar.clone(),
        Arc::new(WhatsAppSender::new(whatsapp)),
        hub.clone() as Arc<dyn EventPublisher>,
        rules,
        OrchestratorConfig::default(),
    ));
    let router = ConversationRouter::new(orch.clone());

    // Background maintenance: abandonment sweep and calendar reconciliation.
    tokio::spawn(orchestrator::sweep::run(
        orch.clone(),
        hub.clone() as Arc<dyn EventPublisher>,
    ));
    tokio::spawn(orchestrator::reconcile::run(
        db.clone(),
        calendar.clone() as Arc<dyn graph_calendar::CalendarApi>,
        hub.clone() as Arc<dyn EventPublisher>,
    ));

    let state = AppState {
        db,
        router,
        hub,
        calendar,
        webhook,
        service_key: config.service_key.clone(),
        started: Instant::now(),
    };

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(addr = %config.addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
