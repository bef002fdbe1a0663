//! Read-model aggregations for the operator dashboard.
//!
//! Everything here is best-effort consistent: counts may trail the event
//! stream by a single write, which dashboard consumers tolerate.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::LeadQualification;

/// Headline dashboard numbers.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_conversations: i64,
    pub meetings_today: i64,
    pub leads_by_step: Vec<StepCount>,
}

/// Lead count for a single step.
#[derive(Debug, Clone, Serialize)]
pub struct StepCount {
    pub step: String,
    pub count: i64,
}

/// One stage of the conversion funnel.
#[derive(Debug, Clone, Serialize)]
pub struct FunnelStage {
    pub step: String,
    /// Leads at this step or any later forward step.
    pub reached: i64,
    /// `reached` relative to the previous stage, in percent.
    pub conversion_pct: f64,
}

/// Message and meeting volume for one hour bucket.
#[derive(Debug, Clone, Serialize)]
pub struct HourBucket {
    /// `YYYY-MM-DDTHH` in UTC.
    pub hour: String,
    pub messages: i64,
    pub meetings: i64,
}

/// Agent responsiveness and tool reliability over a window.
#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformance {
    pub replies: i64,
    pub mean_response_secs: f64,
    pub median_response_secs: f64,
    /// Tool invocations applied in the window.
    pub tool_calls: i64,
    /// Share of those that succeeded, in percent; 100 when none ran.
    pub tool_success_rate_pct: f64,
}

/// Headline numbers for the dashboard landing view.
pub async fn dashboard_stats(pool: &SqlitePool, today: &str) -> Result<DashboardStats> {
    let total_users = crate::user::count_users(pool).await?;

    let active_conversations = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM conversations WHERE status = 'active'",
    )
    .fetch_one(pool)
    .await?;

    let meetings_today = crate::meeting::count_meetings_on_day(pool, today).await?;

    let leads_by_step = crate::lead::count_by_step(pool)
        .await?
        .into_iter()
        .map(|(step, count)| StepCount { step, count })
        .collect();

    Ok(DashboardStats {
        total_users,
        active_conversations,
        meetings_today,
        leads_by_step,
    })
}

const FUNNEL_ORDER: [&str; 7] = [
    "start",
    "consent",
    "personal_data",
    "bant",
    "requirements",
    "meeting",
    "completed",
];

/// Counts per stage plus stage-to-stage conversion rates.
///
/// A lead "reached" a stage if its current step is that stage or any later
/// forward stage; abandoned leads count only toward the stages they passed
/// (approximated by their resting step, which the sweep leaves in place).
pub async fn conversion_funnel(pool: &SqlitePool) -> Result<Vec<FunnelStage>> {
    let by_step = crate::lead::count_by_step(pool).await?;
    let count_at = |step: &str| -> i64 {
        by_step
            .iter()
            .find(|(s, _)| s == step)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    };

    let mut stages = Vec::with_capacity(FUNNEL_ORDER.len());
    let mut previous: Option<i64> = None;

    for (i, step) in FUNNEL_ORDER.iter().enumerate() {
        let reached: i64 = FUNNEL_ORDER[i..].iter().map(|s| count_at(s)).sum();
        let conversion_pct = match previous {
            Some(prev) if prev > 0 => (reached as f64 / prev as f64) * 100.0,
            Some(_) => 0.0,
            None => 100.0,
        };
        stages.push(FunnelStage {
            step: step.to_string(),
            reached,
            conversion_pct,
        });
        previous = Some(reached);
    }

    Ok(stages)
}

/// Per-hour message and meeting counts between two RFC3339 bounds.
pub async fn activity_timeline(
    pool: &SqlitePool,
    from: &str,
    to: &str,
) -> Result<Vec<HourBucket>> {
    let message_rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT substr(created_at, 1, 13) AS hour, COUNT(*)
        FROM messages
        WHERE created_at >= ? AND created_at < ? AND deleted = 0
        GROUP BY hour ORDER BY hour
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let meeting_rows = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT substr(start_time, 1, 13) AS hour, COUNT(*)
        FROM meetings
        WHERE start_time >= ? AND start_time < ? AND status != 'cancelled'
        GROUP BY hour ORDER BY hour
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut buckets: Vec<HourBucket> = message_rows
        .into_iter()
        .map(|(hour, messages)| HourBucket {
            hour,
            messages,
            meetings: 0,
        })
        .collect();

    for (hour, meetings) in meeting_rows {
        match buckets.iter_mut().find(|b| b.hour == hour) {
            Some(bucket) => bucket.meetings = meetings,
            None => buckets.push(HourBucket {
                hour,
                messages: 0,
                meetings,
            }),
        }
    }
    buckets.sort_by(|a, b| a.hour.cmp(&b.hour));
    Ok(buckets)
}

/// Mean/median delay between a user message and the next assistant reply in
/// the same conversation, plus the tool-call success rate, over activity
/// after `since`.
pub async fn agent_performance(pool: &SqlitePool, since: &str) -> Result<AgentPerformance> {
    let (tool_calls, tool_successes) = crate::tool_history::counts_since(pool, since).await?;
    let tool_success_rate_pct = if tool_calls > 0 {
        tool_successes as f64 / tool_calls as f64 * 100.0
    } else {
        100.0
    };
    // Pull the ordered (role, created_at) stream per conversation and pair
    // user turns with the following assistant turn in memory; the volume in
    // a dashboard window is small.
    let rows = sqlx::query_as::<_, (String, String, String)>(
        r#"
        SELECT conversation_id, role, created_at
        FROM messages
        WHERE created_at >= ? AND deleted = 0 AND role IN ('user', 'assistant')
        ORDER BY conversation_id, created_at, id
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut latencies: Vec<f64> = Vec::new();
    let mut pending: Option<(String, chrono::DateTime<chrono::Utc>)> = None;

    for (conversation_id, role, created_at) in rows {
        let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&created_at) else {
            continue;
        };
        let ts = ts.with_timezone(&chrono::Utc);
        match role.as_str() {
            "user" => {
                if pending.as_ref().map_or(true, |(c, _)| *c != conversation_id) {
                    pending = Some((conversation_id, ts));
                }
            }
            "assistant" => {
                if let Some((c, asked)) = pending.take() {
                    if c == conversation_id {
                        latencies.push((ts - asked).num_milliseconds() as f64 / 1000.0);
                    }
                }
            }
            _ => {}
        }
    }

    let replies = latencies.len() as i64;
    if latencies.is_empty() {
        return Ok(AgentPerformance {
            replies: 0,
            mean_response_secs: 0.0,
            median_response_secs: 0.0,
            tool_calls,
            tool_success_rate_pct,
        });
    }

    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
    latencies.sort_by(|a, b| a.total_cmp(b));
    let median = latencies[latencies.len() / 2];

    Ok(AgentPerformance {
        replies,
        mean_response_secs: mean,
        median_response_secs: median,
        tool_calls,
        tool_success_rate_pct,
    })
}

/// Leads currently in a live (non-terminal) step, oldest first.
pub async fn lead_pipeline(pool: &SqlitePool) -> Result<Vec<LeadQualification>> {
    Ok(sqlx::query_as::<_, LeadQualification>(
        r#"
        SELECT * FROM lead_qualification
        WHERE current_step NOT IN ('completed', 'abandoned')
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(pool)
    .await?)
}

/// Leads that ended in `abandoned`, newest first.
pub async fn abandoned_leads(pool: &SqlitePool) -> Result<Vec<LeadQualification>> {
    Ok(sqlx::query_as::<_, LeadQualification>(
        r#"
        SELECT * FROM lead_qualification
        WHERE current_step = 'abandoned'
        ORDER BY updated_at DESC, id
        "#,
    )
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::upsert_user_and_open_conversation;
    use crate::lead::set_current_step;
    use crate::message::{append_message, NewMessage};
    use crate::test_db;
    use qualification::Step;

    #[tokio::test]
    async fn funnel_counts_later_stages_as_reached() {
        let db = test_db().await;

        let (_, _, l1) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+1111")
            .await
            .unwrap();
        let (_, _, l2) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+2222")
            .await
            .unwrap();
        set_current_step(db.pool(), &l1.id, Step::Bant).await.unwrap();
        set_current_step(db.pool(), &l2.id, Step::Completed).await.unwrap();

        let funnel = conversion_funnel(db.pool()).await.unwrap();
        let start = funnel.iter().find(|s| s.step == "start").unwrap();
        let bant = funnel.iter().find(|s| s.step == "bant").unwrap();
        let completed = funnel.iter().find(|s| s.step == "completed").unwrap();

        assert_eq!(start.reached, 2);
        assert_eq!(bant.reached, 2);
        assert_eq!(completed.reached, 1);
    }

    #[tokio::test]
    async fn dashboard_stats_counts() {
        let db = test_db().await;
        let (_, conv, _) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+1111")
            .await
            .unwrap();
        append_message(db.pool(), &NewMessage::user_text(&conv.id, "hi", None))
            .await
            .unwrap();

        let stats = dashboard_stats(db.pool(), "2026-01-01").await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.active_conversations, 1);
        assert_eq!(stats.meetings_today, 0);
    }

    #[tokio::test]
    async fn performance_includes_tool_success_rate() {
        let db = test_db().await;
        let (_, conv, lead) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+1111")
            .await
            .unwrap();

        crate::tool_history::insert_tool_history(
            db.pool(),
            &conv.id,
            Some(&lead.id),
            "record_bant",
            true,
            None,
        )
        .await
        .unwrap();
        crate::tool_history::insert_tool_history(
            db.pool(),
            &conv.id,
            Some(&lead.id),
            "schedule_meeting",
            false,
            Some("rejected"),
        )
        .await
        .unwrap();

        let perf = agent_performance(db.pool(), "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(perf.tool_calls, 2);
        assert!((perf.tool_success_rate_pct - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn timeline_buckets_by_hour() {
        let db = test_db().await;
        let (_, conv, _) = upsert_user_and_open_conversation(db.pool(), "whatsapp", "+1111")
            .await
            .unwrap();
        append_message(db.pool(), &NewMessage::user_text(&conv.id, "hi", None))
            .await
            .unwrap();

        let buckets = activity_timeline(
            db.pool(),
            "2000-01-01T00:00:00.000Z",
            "9999-01-01T00:00:00.000Z",
        )
        .await
        .unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].messages, 1);
    }
}
