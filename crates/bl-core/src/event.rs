//! Logged caregiving events.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::types::EventId;

pub(crate) const MS_PER_MINUTE: i64 = 60_000;

/// One logged occurrence in the timeline.
///
/// Everything except a sleep session's end is fixed at creation. Timestamps
/// are stored as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub id: EventId,
    /// Free-form description ("bottle 120ml", "wet diaper"). Opaque to stats.
    pub label: String,
    /// When the caregiver logged the event.
    #[serde(with = "ts_milliseconds")]
    pub occurred_at: DateTime<Utc>,
    /// `HH:MM` in the logging device's time zone, computed once.
    pub display_time: String,
    /// What happened, plus sleep session bookkeeping.
    pub kind: EventKind,
}

/// What was logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Feed,
    Diaper,
    /// Start of a sleep session, closed later by a wake.
    Sleep(SleepSession),
    Wake,
}

/// Sleep bookkeeping carried by a sleep event.
///
/// `end` and `duration_minutes` are absent while the baby is still asleep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSession {
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

impl SleepSession {
    /// An in-progress session that started at `start`.
    #[must_use]
    pub const fn open_at(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
            duration_minutes: None,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

impl EventKind {
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Feed => EventType::Feed,
            Self::Diaper => EventType::Diaper,
            Self::Sleep(_) => EventType::Sleep,
            Self::Wake => EventType::Wake,
        }
    }
}

impl Event {
    /// Creates an event, rendering `display_time` in `tz`.
    pub fn new<Tz>(
        id: EventId,
        kind: EventKind,
        label: impl Into<String>,
        occurred_at: DateTime<Utc>,
        tz: &Tz,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self {
            id,
            label: label.into(),
            occurred_at,
            display_time: occurred_at.with_timezone(tz).format("%H:%M").to_string(),
            kind,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// The sleep session, if this is a sleep event.
    #[must_use]
    pub const fn sleep(&self) -> Option<&SleepSession> {
        match &self.kind {
            EventKind::Sleep(session) => Some(session),
            _ => None,
        }
    }

    /// Effective start of a sleep session; falls back to `occurred_at`.
    #[must_use]
    pub fn sleep_start(&self) -> Option<DateTime<Utc>> {
        self.sleep()
            .map(|session| session.start.unwrap_or(self.occurred_at))
    }

    /// True for a sleep event that has not been closed yet.
    #[must_use]
    pub fn is_open_sleep(&self) -> bool {
        self.sleep().is_some_and(SleepSession::is_open)
    }

    /// The instant used for day bucketing: sleep start for sleeps,
    /// `occurred_at` for everything else.
    #[must_use]
    pub fn anchor(&self) -> DateTime<Utc> {
        self.sleep_start().unwrap_or(self.occurred_at)
    }

    /// Fills in a missing sleep start from `occurred_at`. No-op otherwise.
    pub(crate) fn ensure_sleep_start(&mut self) {
        let occurred_at = self.occurred_at;
        if let EventKind::Sleep(session) = &mut self.kind {
            session.start.get_or_insert(occurred_at);
        }
    }

    /// Closes an open sleep session at `end` and returns the frozen duration.
    ///
    /// Returns `None` (and changes nothing) if this is not an open sleep.
    pub(crate) fn close_sleep(&mut self, end: DateTime<Utc>) -> Option<i64> {
        let start = self.sleep_start()?;
        let EventKind::Sleep(session) = &mut self.kind else {
            return None;
        };
        if !session.is_open() {
            return None;
        }
        let minutes = rounded_minutes(start, end);
        session.start = Some(start);
        session.end = Some(end);
        session.duration_minutes = Some(minutes);
        Some(minutes)
    }
}

/// Whole minutes between two instants, rounded half up, never negative.
pub(crate) fn rounded_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds().max(0);
    (ms + MS_PER_MINUTE / 2) / MS_PER_MINUTE
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};
    use insta::assert_snapshot;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn sleep_event(start_ms: i64) -> Event {
        Event::new(
            EventId::new("sleep-1").unwrap(),
            EventKind::Sleep(SleepSession::open_at(at(start_ms))),
            "sleep",
            at(start_ms),
            &Utc,
        )
    }

    #[test]
    fn open_sleep_serializes_without_end() {
        let event = sleep_event(1_738_152_000_000);
        let json = serde_json::to_string_pretty(&event).unwrap();
        assert_snapshot!(json, @r#"
        {
          "id": "sleep-1",
          "label": "sleep",
          "occurred_at": 1738152000000,
          "display_time": "12:00",
          "kind": {
            "type": "sleep",
            "start": 1738152000000
          }
        }
        "#);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut event = sleep_event(1_738_152_000_000);
        event.close_sleep(at(1_738_152_000_000 + 90 * MS_PER_MINUTE));

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
        assert_eq!(parsed.sleep().unwrap().duration_minutes, Some(90));
    }

    #[test]
    fn legacy_sleep_without_start_uses_occurred_at() {
        let json = r#"{
            "id": "1733400000000",
            "label": "sleep",
            "occurred_at": 1733400000000,
            "display_time": "14:00",
            "kind": {"type": "sleep"}
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();

        assert!(event.is_open_sleep());
        assert_eq!(event.sleep_start(), Some(at(1_733_400_000_000)));
    }

    #[test]
    fn event_rejects_unknown_kind() {
        let json = r#"{
            "id": "x",
            "label": "bath",
            "occurred_at": 0,
            "display_time": "00:00",
            "kind": {"type": "bath"}
        }"#;
        let result: Result<Event, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn display_time_uses_given_zone() {
        let jerusalem = FixedOffset::east_opt(2 * 3600).unwrap();
        let event = Event::new(
            EventId::new("feed-1").unwrap(),
            EventKind::Feed,
            "bottle 90ml",
            at(1_738_152_000_000),
            &jerusalem,
        );
        assert_eq!(event.display_time, "14:00");
    }

    #[test]
    fn close_sleep_rounds_to_nearest_minute() {
        let mut event = sleep_event(0);
        let end = at(0) + Duration::seconds(44 * 60 + 30);
        assert_eq!(event.close_sleep(end), Some(45));

        let mut event = sleep_event(0);
        let end = at(0) + Duration::seconds(44 * 60 + 29);
        assert_eq!(event.close_sleep(end), Some(44));
    }

    #[test]
    fn close_sleep_clamps_out_of_order_end_to_zero() {
        let mut event = sleep_event(10 * MS_PER_MINUTE);
        assert_eq!(event.close_sleep(at(0)), Some(0));
        assert_eq!(event.sleep().unwrap().end, Some(at(0)));
    }

    #[test]
    fn closed_sleep_is_frozen() {
        let mut event = sleep_event(0);
        event.close_sleep(at(30 * MS_PER_MINUTE));
        assert_eq!(event.close_sleep(at(90 * MS_PER_MINUTE)), None);
        assert_eq!(event.sleep().unwrap().duration_minutes, Some(30));
    }

    #[test]
    fn only_sleeps_can_be_closed() {
        let mut event = Event::new(
            EventId::new("wake-1").unwrap(),
            EventKind::Wake,
            "woke up",
            at(0),
            &Utc,
        );
        assert_eq!(event.close_sleep(at(60_000)), None);
        assert_eq!(event.anchor(), at(0));
    }
}
