//! Assembling the stage machine's view of a lead.

use chrono::{DateTime, Duration, Utc};
use database::{models::LeadQualification, Database};
use qualification::{LeadView, Step};

use crate::error::OrchestratorError;

/// Days without a user message before a lead is abandoned.
pub const IDLE_DAYS: i64 = 7;

/// Per-turn signals the effect application discovered; everything else in
/// the view comes from the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnSignals {
    pub consent_refused: bool,
    pub refusal_count: u32,
    pub declined: bool,
}

/// Build the stage machine input from the persisted state of a lead.
pub async fn lead_view(
    db: &Database,
    lead: &LeadQualification,
    signals: TurnSignals,
    now: DateTime<Utc>,
) -> Result<LeadView, OrchestratorError> {
    let pool = db.pool();

    let user = database::user::get_user(pool, &lead.user_id).await?;
    let bant = database::bant::get_bant(pool, &lead.id).await?;
    let requirements = database::requirements::get_requirements(pool, &lead.id).await?;
    let feature_count = database::requirements::count_features(pool, &lead.id).await?;
    let meeting = database::meeting::active_meeting_for_lead(pool, &lead.id).await?;

    let latest_user_at =
        database::message::latest_user_message_at(pool, &lead.conversation_id).await?;
    let has_user_turn = latest_user_at.is_some();
    let idle_expired = match latest_user_at {
        Some(ts) => DateTime::parse_from_rfc3339(&ts)
            .map(|t| now - t.with_timezone(&Utc) > Duration::days(IDLE_DAYS))
            .unwrap_or(false),
        None => false,
    };

    let current: Step = lead
        .current_step
        .parse()
        .unwrap_or(Step::Start);

    Ok(LeadView {
        current,
        has_user_turn,
        consent: lead.consent,
        consent_refused: signals.consent_refused,
        refusal_count: signals.refusal_count,
        has_full_name: !user.full_name.trim().is_empty(),
        has_contact: user.email.is_some() || user.phone.is_some(),
        bant_complete: bant.map(|b| b.is_complete()).unwrap_or(false),
        has_app_type: requirements
            .and_then(|r| r.app_type)
            .is_some_and(|a| !a.trim().is_empty()),
        feature_count: feature_count as u32,
        has_scheduled_meeting: meeting.is_some_and(|m| m.status == "scheduled"),
        declined: signals.declined,
        idle_expired,
    })
}
