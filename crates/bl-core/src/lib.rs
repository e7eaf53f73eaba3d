//! Core domain logic for the baby log.
//!
//! This crate contains the fundamental types and logic for:
//! - Events: feeds, diapers and sleep sessions closed by a wake
//! - The event store: sleep/wake pairing and snapshot persistence
//! - Statistics: per-day totals, averages and a rolling sleep trend

mod config;
pub mod daily;
pub mod entry;
pub mod event;
pub mod event_type;
mod session;
pub mod store;
pub mod trend;
pub mod types;

pub use config::{MAX_TREND_DAYS, MAX_TREND_WINDOW_HOURS, StatsConfig, StatsConfigError};
pub use daily::{BabyStats, DailyStats, daily_stats};
pub use entry::{DiaperForm, DiaperKind, Entry, EntryError, FeedForm, FeedMethod, Side};
pub use event::{Event, EventKind, SleepSession};
pub use event_type::{EventType, UnknownEventType};
pub use store::{EventStore, MemoryStorage, Persistence, Snapshot, SnapshotStorage, StoreError};
pub use trend::{SleepTrend, TrendPoint, sleep_trend};
pub use types::{EventId, ValidationError};
