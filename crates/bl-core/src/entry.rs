//! Turning caregiver input into events.
//!
//! Forms arrive as loosely typed strings; everything downstream of
//! [`Entry::into_event`] works on the strict [`Event`] schema.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::event::{Event, EventKind, SleepSession};
use crate::event_type::{EventType, UnknownEventType};
use crate::types::EventId;

/// Input rejected before it became an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("choose a feed method (breast or bottle)")]
    MissingFeedMethod,

    #[error("unknown feed method: {0}")]
    UnknownFeedMethod(String),

    #[error("enter a bottle amount")]
    MissingAmount,

    #[error("bottle amount must be a positive number of millilitres, got {0:?}")]
    InvalidAmount(String),

    #[error("choose a breastfeeding side")]
    MissingSide,

    #[error("unknown breastfeeding side: {0}")]
    UnknownSide(String),

    #[error("choose a diaper kind")]
    MissingDiaperKind,

    #[error("unknown diaper kind: {0}")]
    UnknownDiaperKind(String),

    #[error("{0} entries need details; use the form")]
    NeedsDetails(EventType),

    #[error(transparent)]
    UnknownAction(#[from] UnknownEventType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn parse(raw: &str) -> Result<Self, EntryError> {
        match raw.trim() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(EntryError::UnknownSide(other.to_string())),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMethod {
    Bottle { amount_ml: u32 },
    Breast { side: Side },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiaperKind {
    Wet,
    Poop,
    Mixed,
}

impl DiaperKind {
    fn parse(raw: &str) -> Result<Self, EntryError> {
        match raw.trim() {
            "wet" => Ok(Self::Wet),
            "poop" => Ok(Self::Poop),
            "mixed" => Ok(Self::Mixed),
            other => Err(EntryError::UnknownDiaperKind(other.to_string())),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Wet => "wet",
            Self::Poop => "poop",
            Self::Mixed => "mixed",
        }
    }
}

/// A validated log entry, ready to be stamped with a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Feed { method: FeedMethod, notes: String },
    Diaper { kind: DiaperKind, notes: String },
    Sleep,
    Wake,
}

impl Entry {
    /// The one-tap entry for `event_type`.
    ///
    /// Feeds and diapers carry details and must come through a form.
    pub fn quick(event_type: EventType) -> Result<Self, EntryError> {
        match event_type {
            EventType::Sleep => Ok(Self::Sleep),
            EventType::Wake => Ok(Self::Wake),
            EventType::Feed | EventType::Diaper => Err(EntryError::NeedsDetails(event_type)),
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Feed { .. } => EventType::Feed,
            Self::Diaper { .. } => EventType::Diaper,
            Self::Sleep => EventType::Sleep,
            Self::Wake => EventType::Wake,
        }
    }

    /// Human-readable label stored on the event.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Feed { method, notes } => {
                let base = match method {
                    FeedMethod::Bottle { amount_ml } => format!("bottle {amount_ml}ml"),
                    FeedMethod::Breast { side } => format!("breastfeed ({})", side.as_str()),
                };
                with_notes(base, notes)
            }
            Self::Diaper { kind, notes } => {
                with_notes(format!("{} diaper", kind.as_str()), notes)
            }
            Self::Sleep => "sleep".to_string(),
            Self::Wake => "woke up".to_string(),
        }
    }

    /// Stamps the entry at `at` with a fresh id.
    pub fn into_event<Tz>(self, at: DateTime<Utc>, tz: &Tz) -> Event
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let label = self.label();
        let kind = match self {
            Self::Feed { .. } => EventKind::Feed,
            Self::Diaper { .. } => EventKind::Diaper,
            Self::Sleep => EventKind::Sleep(SleepSession::open_at(at)),
            Self::Wake => EventKind::Wake,
        };
        Event::new(EventId::generate(), kind, label, at, tz)
    }
}

/// Parses a quick-action name (`"sleep"`, `"wake"`).
impl FromStr for Entry {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::quick(s.trim().parse()?)
    }
}

fn with_notes(base: String, notes: &str) -> String {
    let notes = notes.trim();
    if notes.is_empty() {
        base
    } else {
        format!("{base} ({notes})")
    }
}

/// Raw feed form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedForm {
    /// `"bottle"` or `"breast"`.
    pub method: Option<String>,
    /// Millilitres, as typed. Only read for bottles.
    pub amount: Option<String>,
    /// `"left"` or `"right"`. Only read for breastfeeding.
    pub side: Option<String>,
    pub notes: String,
}

impl TryFrom<FeedForm> for Entry {
    type Error = EntryError;

    fn try_from(form: FeedForm) -> Result<Self, Self::Error> {
        let method = match form.method.as_deref().map(str::trim) {
            None | Some("") => return Err(EntryError::MissingFeedMethod),
            Some("bottle") => FeedMethod::Bottle {
                amount_ml: parse_amount(form.amount.as_deref())?,
            },
            Some("breast") => {
                let side = form
                    .side
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(EntryError::MissingSide)?;
                FeedMethod::Breast {
                    side: Side::parse(side)?,
                }
            }
            Some(other) => return Err(EntryError::UnknownFeedMethod(other.to_string())),
        };
        Ok(Self::Feed {
            method,
            notes: form.notes,
        })
    }
}

fn parse_amount(raw: Option<&str>) -> Result<u32, EntryError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(EntryError::MissingAmount);
    }
    match raw.parse::<u32>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(EntryError::InvalidAmount(raw.to_string())),
    }
}

/// Raw diaper form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiaperForm {
    /// `"wet"`, `"poop"` or `"mixed"`.
    pub kind: Option<String>,
    pub notes: String,
}

impl TryFrom<DiaperForm> for Entry {
    type Error = EntryError;

    fn try_from(form: DiaperForm) -> Result<Self, Self::Error> {
        let kind = form
            .kind
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(EntryError::MissingDiaperKind)?;
        Ok(Self::Diaper {
            kind: DiaperKind::parse(kind)?,
            notes: form.notes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_form(method: &str) -> FeedForm {
        FeedForm {
            method: Some(method.to_string()),
            ..FeedForm::default()
        }
    }

    #[test]
    fn bottle_label_includes_amount_and_notes() {
        let form = FeedForm {
            amount: Some(" 120 ".to_string()),
            notes: "  fussy at the end ".to_string(),
            ..feed_form("bottle")
        };
        let entry = Entry::try_from(form).unwrap();
        assert_eq!(entry.label(), "bottle 120ml (fussy at the end)");
    }

    #[test]
    fn breast_label_names_side() {
        let form = FeedForm {
            side: Some("left".to_string()),
            ..feed_form("breast")
        };
        assert_eq!(Entry::try_from(form).unwrap().label(), "breastfeed (left)");
    }

    #[test]
    fn feed_form_rejects_incomplete_input() {
        assert_eq!(
            Entry::try_from(FeedForm::default()),
            Err(EntryError::MissingFeedMethod)
        );
        assert_eq!(
            Entry::try_from(feed_form("bottle")),
            Err(EntryError::MissingAmount)
        );
        assert_eq!(
            Entry::try_from(feed_form("breast")),
            Err(EntryError::MissingSide)
        );
        assert_eq!(
            Entry::try_from(feed_form("formula")),
            Err(EntryError::UnknownFeedMethod("formula".to_string()))
        );
    }

    #[test]
    fn bottle_amount_must_be_positive_integer() {
        for raw in ["0", "abc", "-5", "12.5"] {
            let form = FeedForm {
                amount: Some(raw.to_string()),
                ..feed_form("bottle")
            };
            assert_eq!(
                Entry::try_from(form),
                Err(EntryError::InvalidAmount(raw.to_string()))
            );
        }
    }

    #[test]
    fn diaper_labels() {
        for (kind, label) in [
            ("wet", "wet diaper"),
            ("poop", "poop diaper"),
            ("mixed", "mixed diaper"),
        ] {
            let form = DiaperForm {
                kind: Some(kind.to_string()),
                notes: "   ".to_string(),
            };
            assert_eq!(Entry::try_from(form).unwrap().label(), label);
        }
    }

    #[test]
    fn diaper_form_requires_known_kind() {
        assert_eq!(
            Entry::try_from(DiaperForm::default()),
            Err(EntryError::MissingDiaperKind)
        );
        let form = DiaperForm {
            kind: Some("dry".to_string()),
            notes: String::new(),
        };
        assert_eq!(
            Entry::try_from(form),
            Err(EntryError::UnknownDiaperKind("dry".to_string()))
        );
    }

    #[test]
    fn forms_deserialize_from_partial_json() {
        let form: FeedForm =
            serde_json::from_str(r#"{"method": "bottle", "amount": "90"}"#).unwrap();
        assert_eq!(
            Entry::try_from(form).unwrap(),
            Entry::Feed {
                method: FeedMethod::Bottle { amount_ml: 90 },
                notes: String::new(),
            }
        );
    }

    #[test]
    fn quick_actions_cover_sleep_and_wake_only() {
        assert_eq!(Entry::quick(EventType::Sleep), Ok(Entry::Sleep));
        assert_eq!(Entry::quick(EventType::Wake), Ok(Entry::Wake));
        let err = Entry::quick(EventType::Feed).unwrap_err();
        assert_eq!(err.to_string(), "feed entries need details; use the form");
    }

    #[test]
    fn quick_actions_parse_from_names() {
        assert_eq!(" sleep ".parse::<Entry>(), Ok(Entry::Sleep));
        assert_eq!("wake".parse::<Entry>(), Ok(Entry::Wake));
        assert_eq!(
            "diaper".parse::<Entry>(),
            Err(EntryError::NeedsDetails(EventType::Diaper))
        );
        let err = "nap".parse::<Entry>().unwrap_err();
        assert!(matches!(err, EntryError::UnknownAction(_)));
        assert_eq!(err.to_string(), "unknown event type: nap");
    }

    #[test]
    fn into_event_opens_sleep_at_given_time() {
        let at = DateTime::from_timestamp_millis(1_738_152_000_000).unwrap();
        let event = Entry::Sleep.into_event(at, &Utc);

        assert_eq!(event.event_type(), EventType::Sleep);
        assert_eq!(event.label, "sleep");
        assert_eq!(event.display_time, "12:00");
        assert!(event.is_open_sleep());
        assert_eq!(event.sleep_start(), Some(at));
    }

    #[test]
    fn into_event_assigns_fresh_ids() {
        let at = DateTime::from_timestamp_millis(0).unwrap();
        let a = Entry::Wake.into_event(at, &Utc);
        let b = Entry::Wake.into_event(at, &Utc);
        assert_ne!(a.id, b.id);
        assert_eq!(a.label, "woke up");
        assert_eq!(a.event_type(), Entry::Wake.event_type());
    }
}
