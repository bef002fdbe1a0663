//! Calendar value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open busy interval `[start, end)` on the owner's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end)` intersects another half-open interval.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// A free slot offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A calendar event as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_cancelled: bool,
    pub online_meeting_url: Option<String>,
}

/// Result of creating an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    /// Provider event id.
    pub external_id: String,
    /// Join link when the event was created as an online meeting.
    pub join_url: Option<String>,
}

/// Partial update for an existing event. `None` fields are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub subject: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// A pure reschedule.
    pub fn times(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            subject: None,
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.start.is_none() && self.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 3, h, 0, 0).unwrap()
    }

    #[test]
    fn half_open_intersection() {
        let busy = BusyInterval::new(at(10), at(11));
        // Touching endpoints do not intersect.
        assert!(!busy.intersects(at(9), at(10)));
        assert!(!busy.intersects(at(11), at(12)));
        // Overlap does.
        assert!(busy.intersects(at(10), at(11)));
        assert!(busy.intersects(at(9), at(12)));
    }
}
