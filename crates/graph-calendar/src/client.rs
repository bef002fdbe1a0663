//! Graph calendar HTTP client.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::CalendarConfig;
use crate::error::CalendarError;
use crate::token::TokenProvider;
use crate::types::{BusyInterval, CalendarEvent, CreatedEvent, EventPatch};

/// Backoff schedule: base 500 ms, doubling, capped at 30 s, 5 attempts total.
const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 30_000;

fn backoff_delay(attempt: u32) -> StdDuration {
    let ms = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(16));
    StdDuration::from_millis(ms.min(BACKOFF_CAP_MS))
}

/// The calendar operations the orchestrator's scheduling tools need.
///
/// A trait seam so tests can substitute a scripted calendar.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Busy intervals on the owner's calendar inside a window.
    async fn get_schedule(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError>;

    /// Create an event, optionally as an online meeting.
    async fn create_event(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[String],
        online: bool,
    ) -> Result<CreatedEvent, CalendarError>;

    /// Patch an existing event.
    async fn update_event(&self, external_id: &str, patch: EventPatch)
        -> Result<(), CalendarError>;

    /// Cancel (delete) an event.
    async fn cancel_event(&self, external_id: &str) -> Result<(), CalendarError>;

    /// List events modified or starting after `since`, for reconciliation.
    async fn sync(&self, since: DateTime<Utc>) -> Result<Vec<CalendarEvent>, CalendarError>;
}

/// Graph API implementation of [`CalendarApi`].
#[derive(Clone)]
pub struct GraphCalendarClient {
    http: Client,
    config: CalendarConfig,
    tokens: TokenProvider,
}

impl GraphCalendarClient {
    /// Create a client with a 30 second request timeout.
    pub fn new(config: CalendarConfig) -> Result<Self, CalendarError> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()?;
        let tokens = TokenProvider::new(http.clone(), config.clone());
        Ok(Self {
            http,
            config,
            tokens,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Issue a request with the retry schedule. Transient failures (network
    /// errors, 5xx, 429) back off and retry; other 4xx surface immediately.
    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, CalendarError> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff_delay(attempt - 1);
                debug!(attempt, ?delay, "retrying calendar request");
                tokio::time::sleep(delay).await;
            }

            let token = self.tokens.bearer().await?;
            let mut request = self.http.request(method.clone(), url).bearer_auth(token);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        if status == StatusCode::NO_CONTENT {
                            return Ok(None);
                        }
                        return Ok(Some(resp.json().await?));
                    }
                    let message = resp.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "transient calendar failure");
                        last_error = format!("{status}: {message}");
                        continue;
                    }
                    return Err(CalendarError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "calendar transport failure");
                    last_error = e.to_string();
                }
            }
        }

        Err(CalendarError::Unavailable {
            attempts: MAX_ATTEMPTS,
            message: last_error,
        })
    }
}

fn graph_time(t: DateTime<Utc>) -> Value {
    json!({
        "dateTime": t.to_rfc3339_opts(SecondsFormat::Secs, true),
        "timeZone": "UTC",
    })
}

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    value: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
struct ScheduleEntry {
    #[serde(rename = "scheduleItems", default)]
    schedule_items: Vec<ScheduleItem>,
}

#[derive(Debug, Deserialize)]
struct ScheduleItem {
    status: String,
    start: GraphDateTime,
    end: GraphDateTime,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

impl GraphDateTime {
    fn to_utc(&self) -> Result<DateTime<Utc>, CalendarError> {
        // Graph returns naive timestamps in the requested zone (UTC here).
        let trimmed = self.date_time.trim_end_matches('Z');
        chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| CalendarError::InvalidRequest(format!("bad provider time: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    id: String,
    #[serde(rename = "onlineMeeting", default)]
    online_meeting: Option<OnlineMeeting>,
}

#[derive(Debug, Deserialize)]
struct OnlineMeeting {
    #[serde(rename = "joinUrl", default)]
    join_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    value: Vec<ListedEvent>,
}

#[derive(Debug, Deserialize)]
struct ListedEvent {
    id: String,
    #[serde(default)]
    subject: String,
    #[serde(rename = "isCancelled", default)]
    is_cancelled: bool,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(rename = "onlineMeeting", default)]
    online_meeting: Option<OnlineMeeting>,
}

#[async_trait]
impl CalendarApi for GraphCalendarClient {
    async fn get_schedule(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        if window_end <= window_start {
            return Err(CalendarError::InvalidRequest("empty schedule window".into()));
        }

        let url = format!("{}/calendar/getSchedule", self.config.calendar_url());
        let body = json!({
            "schedules": [self.config.user_email],
            "startTime": graph_time(window_start),
            "endTime": graph_time(window_end),
            "availabilityViewInterval": 30,
        });

        let value = self
            .request(Method::POST, &url, Some(&body))
            .await?
            .unwrap_or_default();
        let schedule: ScheduleResponse = serde_json::from_value(value)?;

        let mut busy = Vec::new();
        for entry in schedule.value {
            for item in entry.schedule_items {
                if item.status == "free" {
                    continue;
                }
                busy.push(BusyInterval::new(item.start.to_utc()?, item.end.to_utc()?));
            }
        }
        busy.sort_by_key(|b| b.start);
        Ok(busy)
    }

    async fn create_event(
        &self,
        subject: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        attendees: &[String],
        online: bool,
    ) -> Result<CreatedEvent, CalendarError> {
        if end <= start {
            return Err(CalendarError::InvalidRequest(
                "event start must precede its end".into(),
            ));
        }

        let url = format!("{}/calendar/events", self.config.calendar_url());
        let attendee_list: Vec<Value> = attendees
            .iter()
            .map(|email| {
                json!({
                    "emailAddress": { "address": email },
                    "type": "required",
                })
            })
            .collect();

        let body = json!({
            "subject": subject,
            "start": graph_time(start),
            "end": graph_time(end),
            "attendees": attendee_list,
            "isOnlineMeeting": online,
            "onlineMeetingProvider": if online { "teamsForBusiness" } else { "unknown" },
        });

        let value = self
            .request(Method::POST, &url, Some(&body))
            .await?
            .unwrap_or_default();
        let event: EventResponse = serde_json::from_value(value)?;

        Ok(CreatedEvent {
            external_id: event.id,
            join_url: event.online_meeting.and_then(|m| m.join_url),
        })
    }

    async fn update_event(
        &self,
        external_id: &str,
        patch: EventPatch,
    ) -> Result<(), CalendarError> {
        if patch.is_empty() {
            return Ok(());
        }
        let url = format!("{}/events/{}", self.config.calendar_url(), external_id);

        let mut body = json!({});
        if let Some(subject) = &patch.subject {
            body["subject"] = json!(subject);
        }
        if let Some(start) = patch.start {
            body["start"] = graph_time(start);
        }
        if let Some(end) = patch.end {
            body["end"] = graph_time(end);
        }

        self.request(Method::PATCH, &url, Some(&body)).await?;
        Ok(())
    }

    async fn cancel_event(&self, external_id: &str) -> Result<(), CalendarError> {
        let url = format!("{}/events/{}", self.config.calendar_url(), external_id);
        self.request(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn sync(&self, since: DateTime<Utc>) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = format!(
            "{}/calendarView?startDateTime={}&endDateTime={}",
            self.config.calendar_url(),
            since.to_rfc3339_opts(SecondsFormat::Secs, true),
            (since + chrono::Duration::days(90)).to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let value = self
            .request(Method::GET, &url, None)
            .await?
            .unwrap_or_default();
        let list: EventListResponse = serde_json::from_value(value)?;

        list.value
            .into_iter()
            .map(|e| {
                Ok(CalendarEvent {
                    start: e.start.to_utc()?,
                    end: e.end.to_utc()?,
                    id: e.id,
                    subject: e.subject,
                    is_cancelled: e.is_cancelled,
                    online_meeting_url: e.online_meeting.and_then(|m| m.join_url),
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for GraphCalendarClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphCalendarClient")
            .field("user_email", &self.config.user_email)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), StdDuration::from_millis(500));
        assert_eq!(backoff_delay(1), StdDuration::from_millis(1000));
        assert_eq!(backoff_delay(2), StdDuration::from_millis(2000));
        assert_eq!(backoff_delay(10), StdDuration::from_millis(30_000));
    }

    #[test]
    fn provider_times_parse_without_zone_suffix() {
        let t = GraphDateTime {
            date_time: "2026-06-03T09:00:00.0000000".into(),
        };
        let parsed = t.to_utc().unwrap();
        assert_eq!(
            parsed.to_rfc3339_opts(SecondsFormat::Secs, true),
            "2026-06-03T09:00:00Z"
        );
    }
}
