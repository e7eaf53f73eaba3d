//! Sleep session attribution shared by the aggregators.
//!
//! Both aggregators credit a session to the local date of its start. A session
//! that is still open counts `now - start` towards that date, but only while
//! that date is today.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::debug;

use crate::event::{Event, MS_PER_MINUTE, SleepSession};

/// How a sleep session was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    Open,
    Closed { end: DateTime<Utc>, minutes: i64 },
    /// End and duration disagree (one without the other, or negative).
    Malformed,
}

pub(crate) fn recorded(session: &SleepSession) -> Recorded {
    match (session.end, session.duration_minutes) {
        (None, None) => Recorded::Open,
        (Some(end), Some(minutes)) if minutes >= 0 => Recorded::Closed { end, minutes },
        _ => Recorded::Malformed,
    }
}

pub(crate) fn local_date<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Fractional minutes from `start` to `end`, never negative.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / MS_PER_MINUTE as f64
}

/// The open session's contribution at `now`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InProgress<'a> {
    pub event: &'a Event,
    pub date: NaiveDate,
    pub minutes: f64,
}

/// Finds the latest open session and credits its elapsed time to today.
///
/// Returns `None` when nobody is asleep or the session started on an earlier
/// day; such sessions are not split across midnight.
pub(crate) fn in_progress<'a, Tz: TimeZone>(
    events: &'a [Event],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Option<InProgress<'a>> {
    let event = events
        .iter()
        .filter(|e| e.is_open_sleep())
        .max_by_key(|e| e.anchor())?;
    let start = event.sleep_start()?;
    let date = local_date(start, tz);
    if date != local_date(now, tz) {
        debug!(id = %event.id, %date, "open sleep started before today; not counted");
        return None;
    }
    Some(InProgress {
        event,
        date,
        minutes: elapsed_minutes(start, now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::types::EventId;
    use chrono::Duration;

    fn noon() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_738_152_000_000).unwrap()
    }

    fn open_sleep(id: &str, at: DateTime<Utc>) -> Event {
        Event::new(
            EventId::new(id).unwrap(),
            EventKind::Sleep(SleepSession::open_at(at)),
            "sleep",
            at,
            &Utc,
        )
    }

    #[test]
    fn recorded_classifies_sessions() {
        let mut session = SleepSession::open_at(noon());
        assert_eq!(recorded(&session), Recorded::Open);

        session.end = Some(noon() + Duration::minutes(10));
        assert_eq!(recorded(&session), Recorded::Malformed);

        session.duration_minutes = Some(10);
        assert!(matches!(recorded(&session), Recorded::Closed { minutes: 10, .. }));

        session.duration_minutes = Some(-1);
        assert_eq!(recorded(&session), Recorded::Malformed);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact minute values")]
    fn elapsed_minutes_is_fractional_and_clamped() {
        assert_eq!(elapsed_minutes(noon(), noon() + Duration::seconds(90)), 1.5);
        assert_eq!(elapsed_minutes(noon(), noon() - Duration::minutes(3)), 0.0);
    }

    #[test]
    fn in_progress_uses_latest_open_sleep_started_today() {
        let events = vec![
            open_sleep("old", noon() - Duration::hours(2)),
            open_sleep("new", noon() - Duration::minutes(30)),
        ];
        let progress = in_progress(&events, noon(), &Utc).unwrap();
        assert_eq!(progress.event.id.as_str(), "new");
        assert!((progress.minutes - 30.0).abs() < f64::EPSILON);
        assert_eq!(progress.date, noon().date_naive());
    }

    #[test]
    fn in_progress_ignores_sessions_from_yesterday() {
        let events = vec![open_sleep("s", noon() - Duration::hours(13))];
        assert!(in_progress(&events, noon(), &Utc).is_none());
    }
}
