//! End-to-end turn protocol tests with a scripted agent and fake calendar.

use std::sync::Arc;

use agent_core::{ToolInvocation, Turn};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use database::Database;
use graph_calendar::{
    BusyInterval, CalendarApi, CalendarError, CalendarEvent, CreatedEvent, EventPatch, SlotRules,
};
use mock_agent::ScriptedAgent;
use orchestrator::{
    ConversationEvent, InboundText, Orchestrator, OrchestratorConfig, RecordingPublisher,
    RecordingSender,
};
use orchestrator::sender::SendError;
use qualification::Step;

/// Calendar double: fixed busy intervals, canned event ids.
#[derive(Default)]
struct FakeCalendar {
    busy: Vec<BusyInterval>,
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn get_schedule(
        &self,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        Ok(self.busy.clone())
    }

    async fn create_event(
        &self,
        _subject: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _attendees: &[String],
        _online: bool,
    ) -> Result<CreatedEvent, CalendarError> {
        Ok(CreatedEvent {
            external_id: "evt_fake_1".to_string(),
            join_url: Some("https://meet.example/fake".to_string()),
        })
    }

    async fn update_event(
        &self,
        _external_id: &str,
        _patch: EventPatch,
    ) -> Result<(), CalendarError> {
        Ok(())
    }

    async fn cancel_event(&self, _external_id: &str) -> Result<(), CalendarError> {
        Ok(())
    }

    async fn sync(&self, _since: DateTime<Utc>) -> Result<Vec<CalendarEvent>, CalendarError> {
        Ok(Vec::new())
    }
}

struct Harness {
    db: Database,
    orchestrator: Arc<Orchestrator>,
    sender: Arc<RecordingSender>,
    publisher: Arc<RecordingPublisher>,
    conversation_id: String,
    lead_id: String,
}

async fn harness(script: Vec<Turn>) -> Harness {
    harness_with(script, RecordingSender::new(), FakeCalendar::default()).await
}

async fn harness_with(
    script: Vec<Turn>,
    sender: RecordingSender,
    calendar: FakeCalendar,
) -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();

    let (_, conversation, lead) =
        database::intake::upsert_user_and_open_conversation(db.pool(), "whatsapp", "+15550001111")
            .await
            .unwrap();

    let sender = Arc::new(sender);
    let publisher = Arc::new(RecordingPublisher::new());

    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        Arc::new(ScriptedAgent::new(script)),
        Arc::new(calendar),
        sender.clone(),
        publisher.clone(),
        SlotRules::new(chrono_tz::UTC, 9, 18),
        OrchestratorConfig::default(),
    ));

    Harness {
        db,
        orchestrator,
        sender,
        publisher,
        conversation_id: conversation.id,
        lead_id: lead.id,
    }
}

/// A weekday start at 10:00 UTC, comfortably past the 48-hour notice rule.
fn future_weekday_start() -> DateTime<Utc> {
    let mut t = (Utc::now() + Duration::days(4))
        .with_hour(10)
        .unwrap()
        .with_minute(0)
        .unwrap()
        .with_second(0)
        .unwrap()
        .with_nanosecond(0)
        .unwrap();
    while matches!(t.weekday(), Weekday::Sat | Weekday::Sun) {
        t += Duration::days(1);
    }
    t
}

async fn message_count(db: &Database, conversation_id: &str) -> usize {
    database::message::list_conversation_messages(db.pool(), conversation_id)
        .await
        .unwrap()
        .len()
}

async fn current_step(db: &Database, lead_id: &str) -> String {
    database::lead::get_lead(db.pool(), lead_id)
        .await
        .unwrap()
        .current_step
}

#[tokio::test]
async fn consent_refusal_then_retry_abandons() {
    let h = harness(vec![
        Turn::text("Hello! May I process your personal data for this inquiry?"),
        Turn::text("No problem — may I ask again? We need consent to continue.")
            .with_tool(ToolInvocation::RecordConsent { consent: false }),
        Turn::text("Understood, I'll close this conversation. Have a great day!")
            .with_tool(ToolInvocation::RecordConsent { consent: false }),
    ])
    .await;

    let r1 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Hi", Some("m1")))
        .await
        .unwrap();
    assert_eq!(r1.stage, Step::Consent);

    let r2 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "no", Some("m2")))
        .await
        .unwrap();
    assert_eq!(r2.stage, Step::Consent);

    let r3 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "no", Some("m3")))
        .await
        .unwrap();
    assert_eq!(r3.stage, Step::Abandoned);

    assert_eq!(current_step(&h.db, &h.lead_id).await, "abandoned");
    // 3 user + 3 assistant messages.
    assert_eq!(message_count(&h.db, &h.conversation_id).await, 6);
}

#[tokio::test]
async fn happy_path_bant_advances_through_stages() {
    let h = harness(vec![
        Turn::text("Welcome! May I process your data?"),
        Turn::text("Thanks! What's your name and email?")
            .with_tool(ToolInvocation::RecordConsent { consent: true }),
        Turn::text("Nice to meet you, Ana. What budget do you have in mind?").with_tool(
            ToolInvocation::RecordPersonalData {
                full_name: Some("Ana Rodríguez".into()),
                email: Some("ana@acme.io".into()),
                phone: None,
                company: None,
            },
        ),
        Turn::text("Who makes the purchase decision?").with_tool(ToolInvocation::RecordBant {
            budget: Some("20k".into()),
            authority: None,
            need: None,
            timeline: None,
        }),
        Turn::text("What problem are you solving?").with_tool(ToolInvocation::RecordBant {
            budget: None,
            authority: Some("I decide".into()),
            need: None,
            timeline: None,
        }),
        Turn::text("And when do you need it?").with_tool(ToolInvocation::RecordBant {
            budget: None,
            authority: None,
            need: Some("automation".into()),
            timeline: None,
        }),
        Turn::text("Great, let's talk requirements next.").with_tool(
            ToolInvocation::RecordBant {
                budget: None,
                authority: None,
                need: None,
                timeline: Some("Q3".into()),
            },
        ),
    ])
    .await;

    let inputs = ["Hi", "yes", "Ana Rodríguez, ana@acme.io", "budget 20k", "I decide", "need automation"];
    for (i, text) in inputs.iter().enumerate() {
        h.orchestrator
            .process_inbound(InboundText::text(&h.conversation_id, text, Some(&format!("m{i}"))))
            .await
            .unwrap();
    }

    // After the fifth answer the lead sits in bant with three fields set.
    assert_eq!(current_step(&h.db, &h.lead_id).await, "bant");

    let report = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Q3", Some("m6")))
        .await
        .unwrap();
    assert_eq!(report.stage, Step::Requirements);

    let user = database::user::get_user_by_email(h.db.pool(), "ana@acme.io")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.full_name, "Ana Rodríguez");

    let bant = database::bant::get_bant(h.db.pool(), &h.lead_id)
        .await
        .unwrap()
        .unwrap();
    assert!(bant.is_complete());

    // Every applied tool left an outcome row.
    let (total, succeeded) =
        database::tool_history::counts_since(h.db.pool(), "2000-01-01T00:00:00.000Z")
            .await
            .unwrap();
    assert_eq!(total, 6);
    assert_eq!(succeeded, 6);
}

#[tokio::test]
async fn meeting_scheduling_completes_the_lead() {
    let start = future_weekday_start();
    let end = start + Duration::hours(1);

    let h = harness_with(
        vec![
            Turn::text("Here are some options:").with_tool(ToolInvocation::GetAvailableSlots {
                date: start.format("%Y-%m-%d").to_string(),
                duration_minutes: 60,
            }),
            Turn::text("Booked!").with_tool(ToolInvocation::ScheduleMeeting {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
                subject: "Discovery call".into(),
                attendee_email: "ana@acme.io".into(),
            }),
        ],
        RecordingSender::new(),
        FakeCalendar {
            busy: vec![BusyInterval::new(
                start + Duration::hours(3),
                start + Duration::hours(4),
            )],
        },
    )
    .await;

    h.orchestrator
        .override_stage(&h.lead_id, Step::Meeting)
        .await
        .unwrap();

    let r1 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "when can we meet?", Some("m1")))
        .await
        .unwrap();
    let offered = r1.reply.unwrap();
    assert!(offered.content.contains("Available times"));

    let r2 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "the first one works", Some("m2")))
        .await
        .unwrap();
    assert_eq!(r2.stage, Step::Completed);

    let meeting = database::meeting::active_meeting_for_lead(h.db.pool(), &h.lead_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meeting.status, "scheduled");
    assert_eq!(meeting.external_meeting_id.as_deref(), Some("evt_fake_1"));

    let names = h.publisher.names().await;
    assert!(names.contains(&"meeting_created"));
    assert!(names.contains(&"lead_stage_changed"));
}

#[tokio::test]
async fn duplicate_webhook_payload_is_idempotent() {
    let h = harness(vec![Turn::text("Hello!")]).await;

    let first = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Hi", Some("msg_42")))
        .await
        .unwrap();
    assert!(!first.duplicate);
    assert!(first.reply.is_some());

    let second = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Hi", Some("msg_42")))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert!(second.reply.is_none());

    // One user row, one assistant row.
    assert_eq!(message_count(&h.db, &h.conversation_id).await, 2);
    assert_eq!(h.sender.sent().await.len(), 1);
}

#[tokio::test]
async fn operator_takeover_mutes_the_agent() {
    let h = harness(vec![Turn::text("should never be sent")]).await;

    database::conversation::set_agent_enabled(h.db.pool(), &h.conversation_id, false)
        .await
        .unwrap();

    let report = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "anyone there?", Some("m1")))
        .await
        .unwrap();

    assert!(report.agent_muted);
    assert!(report.reply.is_none());
    assert_eq!(message_count(&h.db, &h.conversation_id).await, 1);
    assert!(h.sender.sent().await.is_empty());

    // The inbound message event still fires for operator UIs.
    assert!(h.publisher.names().await.contains(&"new_message"));
}

#[tokio::test]
async fn delivery_failure_keeps_the_message_and_the_flow() {
    let h = harness_with(
        vec![
            Turn::text("May I process your data?"),
            Turn::text("Thanks!").with_tool(ToolInvocation::RecordConsent { consent: true }),
        ],
        RecordingSender::failing(SendError::Permanent("blocked recipient".into())),
        FakeCalendar::default(),
    )
    .await;

    let r1 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Hi", Some("m1")))
        .await
        .unwrap();

    let reply = r1.reply.unwrap();
    assert!(reply.delivery_failed);

    let stored = database::message::get_message(h.db.pool(), &reply.id).await.unwrap();
    assert!(stored.delivery_failed);

    // Both the inbound and the flagged outbound produced events.
    let names = h.publisher.names().await;
    assert_eq!(names.iter().filter(|n| **n == "new_message").count(), 2);

    // The dialogue keeps advancing on the next inbound.
    let r2 = h
        .orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "yes", Some("m2")))
        .await
        .unwrap();
    assert_eq!(r2.stage, Step::PersonalData);
}

#[tokio::test]
async fn events_follow_their_writes() {
    let h = harness(vec![Turn::text("hello")]).await;

    h.orchestrator
        .process_inbound(InboundText::text(&h.conversation_id, "Hi", Some("m1")))
        .await
        .unwrap();

    // Every message referenced by a new_message event is readable.
    for event in h.publisher.events().await {
        if let ConversationEvent::NewMessage(m) = event {
            database::message::get_message(h.db.pool(), &m.id).await.unwrap();
        }
    }
}
