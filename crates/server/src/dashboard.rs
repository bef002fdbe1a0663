//! Dashboard query service.
//!
//! Thin aggregation layer over the store's read models plus live process
//! metrics from the hub and the conversation router. All reads are
//! best-effort consistent.

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::Result;
use crate::state::AppState;
use crate::ws::protocol::actions::Dashboard;

/// Execute a dashboard action.
pub async fn execute(state: &AppState, action: Dashboard) -> Result<Value> {
    let pool = state.db.pool();

    let value = match action {
        Dashboard::GetDashboardStats => {
            let today = Utc::now().format("%Y-%m-%d").to_string();
            let stats = database::stats::dashboard_stats(pool, &today).await?;
            serde_json::to_value(stats).unwrap_or_default()
        }

        Dashboard::GetConversionFunnel => {
            let funnel = database::stats::conversion_funnel(pool).await?;
            serde_json::to_value(funnel).unwrap_or_default()
        }

        Dashboard::GetActivityTimeline { from, to } => {
            let timeline = database::stats::activity_timeline(pool, &from, &to).await?;
            serde_json::to_value(timeline).unwrap_or_default()
        }

        Dashboard::GetAgentPerformance { since } => {
            let since = since.unwrap_or_else(|| {
                (Utc::now() - Duration::days(1)).to_rfc3339_opts(SecondsFormat::Millis, true)
            });
            let perf = database::stats::agent_performance(pool, &since).await?;
            serde_json::to_value(perf).unwrap_or_default()
        }

        Dashboard::GetRealTimeMetrics => {
            // Counts over the hub's sliding window, so the rate reflects
            // current conditions rather than process lifetime.
            let events = state.hub.events_recent();
            let errors = state.hub.errors_recent();
            let error_rate = if events + errors == 0 {
                0.0
            } else {
                errors as f64 / (events + errors) as f64
            };
            json!({
                "open_sessions": state.hub.session_count().await,
                "in_flight_conversations": state.router.active_count().await,
                "events_last_15m": events,
                "errors_last_15m": errors,
                "error_rate": error_rate,
                "uptime_secs": state.started.elapsed().as_secs(),
            })
        }

        Dashboard::GetLeadPipeline => {
            let pipeline = database::stats::lead_pipeline(pool).await?;
            serde_json::to_value(pipeline).unwrap_or_default()
        }

        Dashboard::GetConversionStats => {
            let by_step = database::lead::count_by_step(pool).await?;
            let total: i64 = by_step.iter().map(|(_, c)| c).sum();
            let completed = by_step
                .iter()
                .find(|(s, _)| s == "completed")
                .map(|(_, c)| *c)
                .unwrap_or(0);
            let abandoned = by_step
                .iter()
                .find(|(s, _)| s == "abandoned")
                .map(|(_, c)| *c)
                .unwrap_or(0);
            let completion_rate = if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            json!({
                "total_leads": total,
                "completed": completed,
                "abandoned": abandoned,
                "in_progress": total - completed - abandoned,
                "completion_rate_pct": completion_rate,
            })
        }

        Dashboard::GetAbandonedLeads => {
            let leads = database::stats::abandoned_leads(pool).await?;
            serde_json::to_value(leads).unwrap_or_default()
        }
    };

    Ok(value)
}
