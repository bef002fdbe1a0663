//! Calendar reconciliation.
//!
//! Local meeting rows drift from the provider calendar when events are
//! cancelled or finish out of band. A periodic pass pulls the provider's
//! view and settles the differences: meetings whose event vanished become
//! `cancelled`, meetings past their end become `completed`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use database::Database;
use graph_calendar::CalendarApi;
use tracing::{error, info};

use crate::error::OrchestratorError;
use crate::events::{ConversationEvent, EventPublisher};

/// Interval between reconciliation runs.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Reconcile once. Returns how many meetings changed status.
pub async fn reconcile_once(
    db: &Database,
    calendar: &dyn CalendarApi,
    publisher: &dyn EventPublisher,
) -> Result<usize, OrchestratorError> {
    let pool = db.pool();
    let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let since = Utc::now() - chrono::Duration::days(30);
    let remote = match calendar.sync(since).await {
        Ok(events) => events,
        Err(e) => {
            // Provider trouble is not fatal; try again next interval.
            error!(error = %e, "calendar sync failed");
            return Ok(0);
        }
    };

    let mut changed = 0;
    for meeting in database::meeting::list_meetings(pool).await? {
        if meeting.status == "cancelled" || meeting.status == "completed" {
            continue;
        }

        let Some(external_id) = meeting.external_meeting_id.as_deref() else {
            continue;
        };

        let remote_event = remote.iter().find(|e| e.id == external_id);
        let new_status = match remote_event {
            Some(event) if event.is_cancelled => Some("cancelled"),
            _ if meeting.end_time < now => Some("completed"),
            _ => None,
        };

        if let Some(status) = new_status {
            let updated =
                database::meeting::set_meeting_status(pool, &meeting.id, status).await?;
            info!(meeting = %updated.id, status, "meeting reconciled");
            let event = if status == "cancelled" {
                ConversationEvent::MeetingCancelled(updated)
            } else {
                ConversationEvent::MeetingUpdated(updated)
            };
            publisher.publish(event).await;
            changed += 1;
        }
    }

    Ok(changed)
}

/// Run reconciliation forever on its interval. Spawn once at startup.
pub async fn run(
    db: Database,
    calendar: Arc<dyn CalendarApi>,
    publisher: Arc<dyn EventPublisher>,
) {
    let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match reconcile_once(&db, calendar.as_ref(), publisher.as_ref()).await {
            Ok(0) => {}
            Ok(n) => info!(reconciled = n, "calendar reconciliation finished"),
            Err(e) => error!(error = %e, "calendar reconciliation failed"),
        }
    }
}
