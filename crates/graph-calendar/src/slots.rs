//! Free-slot derivation.
//!
//! Pure functions over busy intervals; the client fetches, this module
//! decides. Slot starts are aligned to 30-minute boundaries inside the
//! working window of the configured timezone.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::CalendarError;
use crate::types::{BusyInterval, Slot};

/// Scheduling rules applied when deriving and validating slots.
#[derive(Debug, Clone)]
pub struct SlotRules {
    pub timezone: Tz,
    /// Working window start hour, local.
    pub work_start_hour: u32,
    /// Working window end hour, local, exclusive.
    pub work_end_hour: u32,
    /// Minimum lead time before a meeting may start.
    pub min_notice: Duration,
}

impl SlotRules {
    pub fn new(timezone: Tz, work_start_hour: u32, work_end_hour: u32) -> Self {
        Self {
            timezone,
            work_start_hour,
            work_end_hour,
            min_notice: Duration::hours(48),
        }
    }

    /// Validate a proposed start against the booking guardrails, returning a
    /// user-presentable reason when it is not bookable.
    pub fn check_start(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), String> {
        if start < now + self.min_notice {
            return Err(format!(
                "meetings need at least {} hours notice",
                self.min_notice.num_hours()
            ));
        }
        let local = start.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return Err("meetings are only available on weekdays".to_string());
        }
        if local.hour() < self.work_start_hour || local.hour() >= self.work_end_hour {
            return Err(format!(
                "meetings are only available between {:02}:00 and {:02}:00",
                self.work_start_hour, self.work_end_hour
            ));
        }
        Ok(())
    }
}

/// Derive the maximal ordered list of free `[t, t+duration)` slots on `date`.
///
/// `t` walks the working window in 30-minute steps; a slot is kept when it
/// fits inside the window and intersects no busy interval. Weekend dates
/// yield an empty list.
pub fn available_slots(
    date: NaiveDate,
    duration: Duration,
    busy: &[BusyInterval],
    rules: &SlotRules,
) -> Result<Vec<Slot>, CalendarError> {
    if duration <= Duration::zero() || duration > Duration::hours(8) {
        return Err(CalendarError::InvalidRequest(format!(
            "unreasonable slot duration: {} minutes",
            duration.num_minutes()
        )));
    }

    if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return Ok(Vec::new());
    }

    let window_start = rules
        .timezone
        .with_ymd_and_hms(
            date.year(),
            date.month(),
            date.day(),
            rules.work_start_hour,
            0,
            0,
        )
        .single()
        .ok_or_else(|| CalendarError::InvalidRequest("ambiguous local time".into()))?
        .with_timezone(&Utc);

    let window_end = rules
        .timezone
        .with_ymd_and_hms(
            date.year(),
            date.month(),
            date.day(),
            rules.work_end_hour,
            0,
            0,
        )
        .single()
        .ok_or_else(|| CalendarError::InvalidRequest("ambiguous local time".into()))?
        .with_timezone(&Utc);

    let mut slots = Vec::new();
    let mut t = window_start;
    while t + duration <= window_end {
        let end = t + duration;
        if !busy.iter().any(|b| b.intersects(t, end)) {
            slots.push(Slot { start: t, end });
        }
        t += Duration::minutes(30);
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;

    fn rules() -> SlotRules {
        SlotRules::new(UTC, 9, 18)
    }

    fn day() -> NaiveDate {
        // A Wednesday.
        NaiveDate::from_ymd_opt(2026, 6, 3).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 3, h, m, 0).unwrap()
    }

    #[test]
    fn free_day_yields_half_hour_grid() {
        let slots = available_slots(day(), Duration::minutes(60), &[], &rules()).unwrap();
        // 09:00 through 17:00 starts inclusive, every 30 minutes.
        assert_eq!(slots.len(), 17);
        assert_eq!(slots.first().unwrap().start, at(9, 0));
        assert_eq!(slots.last().unwrap().start, at(17, 0));
    }

    #[test]
    fn busy_intervals_remove_overlapping_slots() {
        let busy = vec![BusyInterval::new(at(10, 0), at(11, 0))];
        let slots = available_slots(day(), Duration::minutes(60), &busy, &rules()).unwrap();

        assert!(slots.iter().all(|s| !busy[0].intersects(s.start, s.end)));
        // 09:30, 10:00 and 10:30 starts all collide with the busy hour.
        assert!(!slots.iter().any(|s| s.start == at(9, 30)));
        assert!(!slots.iter().any(|s| s.start == at(10, 0)));
        assert!(!slots.iter().any(|s| s.start == at(10, 30)));
        assert!(slots.iter().any(|s| s.start == at(9, 0)));
        assert!(slots.iter().any(|s| s.start == at(11, 0)));
    }

    #[test]
    fn slots_stay_inside_the_window() {
        let slots = available_slots(day(), Duration::minutes(90), &[], &rules()).unwrap();
        let window_end = at(18, 0);
        assert!(slots.iter().all(|s| s.end <= window_end));
        assert_eq!(slots.last().unwrap().start, at(16, 30));
    }

    #[test]
    fn weekends_are_empty() {
        let saturday = NaiveDate::from_ymd_opt(2026, 6, 6).unwrap();
        let slots = available_slots(saturday, Duration::minutes(60), &[], &rules()).unwrap();
        assert!(slots.is_empty());
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = available_slots(day(), Duration::zero(), &[], &rules());
        assert!(matches!(err, Err(CalendarError::InvalidRequest(_))));
    }

    #[test]
    fn notice_and_weekday_guardrails() {
        let r = rules();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();

        // Less than 48 hours out.
        assert!(r.check_start(at(10, 0), now).is_err());

        // Fine: 2026-06-04 10:00 is a Thursday, > 48h after June 1.
        let thursday = Utc.with_ymd_and_hms(2026, 6, 4, 10, 0, 0).unwrap();
        assert!(r.check_start(thursday, now).is_ok());

        // Saturday.
        let saturday = Utc.with_ymd_and_hms(2026, 6, 6, 10, 0, 0).unwrap();
        assert!(r.check_start(saturday, now).is_err());

        // Outside office hours.
        let evening = Utc.with_ymd_and_hms(2026, 6, 4, 20, 0, 0).unwrap();
        assert!(r.check_start(evening, now).is_err());
    }
}
