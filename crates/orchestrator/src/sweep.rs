//! Abandonment sweep.
//!
//! Leads with no user message for seven days move to `abandoned`. The sweep
//! runs at most once every fifteen minutes and publishes a stage-change
//! event per lead it closes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use qualification::Step;
use tracing::{error, info};

use crate::error::OrchestratorError;
use crate::events::ConversationEvent;
use crate::orchestrator::Orchestrator;
use crate::view::IDLE_DAYS;

/// Interval between sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Scan once and abandon every stale lead. Returns how many changed.
pub async fn sweep_once(
    orchestrator: &Orchestrator,
    publisher: &dyn crate::events::EventPublisher,
) -> Result<usize, OrchestratorError> {
    let cutoff = (Utc::now() - chrono::Duration::days(IDLE_DAYS))
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    let stale = database::lead::stale_leads(orchestrator.db().pool(), &cutoff).await?;
    let count = stale.len();

    for lead in stale {
        let previous = lead.current_step.clone();
        let updated =
            database::lead::set_current_step(orchestrator.db().pool(), &lead.id, Step::Abandoned)
                .await?;
        info!(lead = %updated.id, from = %previous, "lead abandoned by timeout");
        publisher
            .publish(ConversationEvent::LeadStageChanged {
                lead: updated,
                previous_step: previous,
            })
            .await;
    }

    Ok(count)
}

/// Run the sweep forever on its interval. Spawn this once at startup.
pub async fn run(
    orchestrator: Arc<Orchestrator>,
    publisher: Arc<dyn crate::events::EventPublisher>,
) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep_once(&orchestrator, publisher.as_ref()).await {
            Ok(0) => {}
            Ok(n) => info!(abandoned = n, "abandonment sweep finished"),
            Err(e) => error!(error = %e, "abandonment sweep failed"),
        }
    }
}
