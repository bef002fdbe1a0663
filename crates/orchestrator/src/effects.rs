//! Applying tool invocations.
//!
//! Each invocation maps to a specific store/calendar call sequence. The batch
//! is applied in order; the first permanent failure records a user-friendly
//! note, skips the remaining invocations, and leaves the stage untouched.
//! Events for successful writes are collected for publication after the turn.

use agent_core::ToolInvocation;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use database::Database;
use graph_calendar::{available_slots, CalendarApi, EventPatch, SlotRules};
use tracing::{info, warn};

use crate::error::OrchestratorError;
use crate::events::ConversationEvent;

/// What a batch of effects produced.
#[derive(Debug, Default)]
pub struct EffectsOutcome {
    /// The user refused consent this turn.
    pub consent_refused: bool,
    /// The user granted consent this turn.
    pub consent_given: bool,
    /// The agent ended the conversation because the user declined.
    pub declined: bool,
    /// User-facing explanation of a failed tool, to append to the reply.
    pub failure_note: Option<String>,
    /// Extra lines to append to the reply (slot listings).
    pub appended_text: Vec<String>,
    /// Events to publish once the turn's writes are done.
    pub events: Vec<ConversationEvent>,
}

/// Dependencies the effect application needs.
pub struct EffectContext<'a> {
    pub db: &'a Database,
    pub calendar: &'a dyn CalendarApi,
    pub rules: &'a SlotRules,
    /// The lead being advanced.
    pub lead_id: &'a str,
    pub user_id: &'a str,
    pub conversation_id: &'a str,
    pub now: DateTime<Utc>,
}

/// Apply a batch of invocations in order.
pub async fn apply_batch(
    ctx: &EffectContext<'_>,
    invocations: &[ToolInvocation],
) -> Result<EffectsOutcome, OrchestratorError> {
    let mut outcome = EffectsOutcome::default();

    for invocation in invocations {
        info!(tool = invocation.name(), "applying tool invocation");
        match apply_one(ctx, invocation, &mut outcome).await {
            Ok(()) => {
                record_outcome(ctx, invocation.name(), true, None).await;
            }
            Err(ApplyError::UserFacing(note)) => {
                warn!(tool = invocation.name(), note = %note, "tool failed; skipping rest of batch");
                record_outcome(ctx, invocation.name(), false, Some(&note)).await;
                outcome.failure_note = Some(note);
                break;
            }
            Err(ApplyError::Fatal(e)) => {
                record_outcome(ctx, invocation.name(), false, Some(&e.to_string())).await;
                return Err(e);
            }
        }
    }

    Ok(outcome)
}

/// Log the invocation outcome for the dashboard's success-rate metric. A
/// failure to log must not fail the turn.
async fn record_outcome(ctx: &EffectContext<'_>, tool: &str, success: bool, error: Option<&str>) {
    if let Err(e) = database::tool_history::insert_tool_history(
        ctx.db.pool(),
        ctx.conversation_id,
        Some(ctx.lead_id),
        tool,
        success,
        error,
    )
    .await
    {
        warn!(tool, error = %e, "failed to record tool outcome");
    }
}

/// Failures inside a single tool application.
enum ApplyError {
    /// Recoverable into a user-facing explanation; the batch stops.
    UserFacing(String),
    /// Infrastructure failure that aborts the turn.
    Fatal(OrchestratorError),
}

impl From<database::DatabaseError> for ApplyError {
    fn from(e: database::DatabaseError) -> Self {
        match e {
            database::DatabaseError::ConstraintViolation(msg) => ApplyError::UserFacing(msg),
            database::DatabaseError::Validation(msg) => ApplyError::UserFacing(msg),
            other => ApplyError::Fatal(other.into()),
        }
    }
}

fn calendar_note(e: graph_calendar::CalendarError) -> ApplyError {
    ApplyError::UserFacing(format!(
        "I couldn't reach the calendar just now ({e}). Let's try again in a moment."
    ))
}

fn parse_rfc3339(value: &str, what: &str) -> Result<DateTime<Utc>, ApplyError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ApplyError::UserFacing(format!("I couldn't understand the {what} time.")))
}

async fn apply_one(
    ctx: &EffectContext<'_>,
    invocation: &ToolInvocation,
    outcome: &mut EffectsOutcome,
) -> Result<(), ApplyError> {
    let pool = ctx.db.pool();

    match invocation {
        ToolInvocation::RecordConsent { consent } => {
            database::lead::set_consent(pool, ctx.lead_id, *consent).await?;
            if *consent {
                outcome.consent_given = true;
            } else {
                outcome.consent_refused = true;
            }
        }

        ToolInvocation::RecordPersonalData {
            full_name,
            email,
            phone,
            company,
        } => {
            let input = database::user::UserInput {
                phone: phone.clone(),
                email: email.clone(),
                full_name: full_name.clone(),
                company: company.clone(),
            };
            database::user::update_user(pool, ctx.user_id, &input).await?;
        }

        ToolInvocation::RecordBant {
            budget,
            authority,
            need,
            timeline,
        } => {
            let patch = database::bant::BantPatch {
                budget: budget.clone(),
                authority: authority.clone(),
                need: need.clone(),
                timeline: timeline.clone(),
            };
            database::bant::record_bant(pool, ctx.lead_id, &patch).await?;
        }

        ToolInvocation::RecordRequirements {
            app_type,
            deadline,
            features,
            integrations,
        } => {
            let features: Vec<(String, Option<String>)> =
                features.iter().map(|f| (f.clone(), None)).collect();
            let integrations: Vec<(String, Option<String>)> =
                integrations.iter().map(|i| (i.clone(), None)).collect();
            database::requirements::create_requirement_package(
                pool,
                ctx.lead_id,
                app_type.as_deref(),
                deadline.as_deref(),
                &features,
                &integrations,
            )
            .await?;
        }

        ToolInvocation::GetAvailableSlots {
            date,
            duration_minutes,
        } => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                ApplyError::UserFacing(
                    "I couldn't understand that date; please use YYYY-MM-DD.".to_string(),
                )
            })?;

            let window_start = date
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .ok_or_else(|| ApplyError::UserFacing("invalid date".to_string()))?;
            let window_end = window_start + Duration::days(1);

            let busy = ctx
                .calendar
                .get_schedule(window_start, window_end)
                .await
                .map_err(calendar_note)?;

            let duration = Duration::minutes(*duration_minutes as i64);
            let slots = available_slots(date, duration, &busy, ctx.rules)
                .map_err(calendar_note)?;

            let bookable: Vec<String> = slots
                .iter()
                .filter(|s| ctx.rules.check_start(s.start, ctx.now).is_ok())
                .map(|s| format!("- {}", s.start.format("%A %d/%m/%Y at %H:%M UTC")))
                .collect();

            if bookable.is_empty() {
                outcome.appended_text.push(format!(
                    "There are no open slots on {}; would another day work?",
                    date.format("%d/%m/%Y")
                ));
            } else {
                outcome
                    .appended_text
                    .push(format!("Available times:\n{}", bookable.join("\n")));
            }
        }

        ToolInvocation::ScheduleMeeting {
            start,
            end,
            subject,
            attendee_email,
        } => {
            if !attendee_email.contains('@') {
                return Err(ApplyError::UserFacing(
                    "I need a valid email address to send the invitation.".to_string(),
                ));
            }
            let start = parse_rfc3339(start, "start")?;
            let end = parse_rfc3339(end, "end")?;
            if end <= start {
                return Err(ApplyError::UserFacing(
                    "The meeting end must come after its start.".to_string(),
                ));
            }
            if let Err(reason) = ctx.rules.check_start(start, ctx.now) {
                return Err(ApplyError::UserFacing(format!(
                    "I can't book that time: {reason}."
                )));
            }

            let created = ctx
                .calendar
                .create_event(subject, start, end, &[attendee_email.clone()], true)
                .await
                .map_err(calendar_note)?;

            let meeting = database::meeting::create_meeting(
                pool,
                &database::meeting::NewMeeting {
                    user_id: ctx.user_id.to_string(),
                    lead_qualification_id: ctx.lead_id.to_string(),
                    external_meeting_id: Some(created.external_id),
                    subject: subject.clone(),
                    start_time: start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    end_time: end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    online_meeting_url: created.join_url.clone(),
                },
            )
            .await?;

            if let Some(url) = &created.join_url {
                outcome
                    .appended_text
                    .push(format!("You can join the meeting here: {url}"));
            }
            outcome.events.push(ConversationEvent::MeetingCreated(meeting));
        }

        ToolInvocation::RescheduleMeeting {
            meeting_id,
            new_start,
            new_end,
        } => {
            let start = parse_rfc3339(new_start, "start")?;
            let end = parse_rfc3339(new_end, "end")?;
            if end <= start {
                return Err(ApplyError::UserFacing(
                    "The meeting end must come after its start.".to_string(),
                ));
            }
            if let Err(reason) = ctx.rules.check_start(start, ctx.now) {
                return Err(ApplyError::UserFacing(format!(
                    "I can't move it there: {reason}."
                )));
            }

            let meeting = database::meeting::get_meeting(pool, meeting_id).await?;
            if let Some(external_id) = &meeting.external_meeting_id {
                ctx.calendar
                    .update_event(external_id, EventPatch::times(start, end))
                    .await
                    .map_err(calendar_note)?;
            }

            let updated = database::meeting::reschedule_meeting(
                pool,
                meeting_id,
                &start.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                &end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            )
            .await?;
            outcome.events.push(ConversationEvent::MeetingUpdated(updated));
        }

        ToolInvocation::CancelMeeting { meeting_id } => {
            let meeting = database::meeting::get_meeting(pool, meeting_id).await?;
            if let Some(external_id) = &meeting.external_meeting_id {
                ctx.calendar
                    .cancel_event(external_id)
                    .await
                    .map_err(calendar_note)?;
            }
            let cancelled =
                database::meeting::set_meeting_status(pool, meeting_id, "cancelled").await?;
            outcome
                .events
                .push(ConversationEvent::MeetingCancelled(cancelled));
        }

        ToolInvocation::EndConversation { reason } => {
            let conversation =
                database::conversation::close_conversation(pool, ctx.conversation_id).await?;
            if reason == "user_declined" {
                outcome.declined = true;
            }
            outcome
                .events
                .push(ConversationEvent::ConversationUpdated(conversation));
        }
    }

    Ok(())
}
