//! The handle a UI holds on to.

use std::fmt;

use anyhow::{Context, Result};
use bl_core::{
    BabyStats, Entry, Event, EventId, EventStore, Persistence, SleepTrend, Snapshot,
    SnapshotStorage, StatsConfig, daily_stats, sleep_trend,
};
use bl_db::Database;
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, warn};

use crate::config::{Config, DEFAULT_STORAGE_KEY};

/// Owns the event store and derives statistics from it.
///
/// Every mutation persists before returning; a failed write is reported in
/// the returned [`Persistence`] and retried on drop.
pub struct Tracker<S: SnapshotStorage = Database, Tz: TimeZone = Local> {
    store: EventStore<S>,
    stats: StatsConfig,
    tz: Tz,
}

impl Tracker {
    /// Opens the configured database and restores the timeline.
    ///
    /// Creates the database directory if needed. Unreadable snapshot
    /// metadata is logged and ignored; the payload alone decides what loads.
    pub fn open(config: &Config) -> Result<Self> {
        debug!(?config, "opening tracker");
        config
            .stats
            .validate()
            .context("invalid stats configuration")?;
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let db = Database::open(&config.database_path).context("failed to open database")?;
        match db.snapshot_updated_at(&config.storage_key) {
            Ok(Some(updated_at)) => debug!(%updated_at, "found persisted timeline"),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to read snapshot metadata"),
        }
        Ok(Self {
            store: EventStore::open(db, config.storage_key.clone()),
            stats: config.stats.clone(),
            tz: Local,
        })
    }
}

impl<S, Tz> Tracker<S, Tz>
where
    S: SnapshotStorage,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    /// Wraps `storage` and restores the timeline stored under the default key.
    pub fn with_storage(storage: S, stats: StatsConfig, tz: Tz) -> Self {
        let mut tracker = Self::unloaded(storage, stats, tz);
        tracker.load();
        tracker
    }

    /// Wraps `storage` without reading it yet. [`is_loading`](Self::is_loading)
    /// stays true until [`load`](Self::load).
    pub fn unloaded(storage: S, stats: StatsConfig, tz: Tz) -> Self {
        Self {
            store: EventStore::new(storage, DEFAULT_STORAGE_KEY),
            stats,
            tz,
        }
    }

    /// Restores the persisted timeline. Returns the number of restored events.
    pub fn load(&mut self) -> usize {
        self.store.load()
    }

    /// Logs `entry` as happening now.
    pub fn add_entry(&mut self, entry: Entry) -> Persistence {
        self.add_entry_at(entry, Utc::now())
    }

    /// Logs `entry` as happening at `at`.
    pub fn add_entry_at(&mut self, entry: Entry, at: DateTime<Utc>) -> Persistence {
        let event = entry.into_event(at, &self.tz);
        self.add_event(event)
    }

    /// Logs the one-tap action named `action` (`"sleep"` or `"wake"`) now.
    pub fn quick_action(&mut self, action: &str) -> Result<Persistence> {
        self.quick_action_at(action, Utc::now())
    }

    pub fn quick_action_at(&mut self, action: &str, at: DateTime<Utc>) -> Result<Persistence> {
        let entry: Entry = action
            .parse()
            .with_context(|| format!("invalid quick action {action:?}"))?;
        Ok(self.add_entry_at(entry, at))
    }

    pub fn add_event(&mut self, event: Event) -> Persistence {
        self.store.add(event)
    }

    pub fn remove_entry(&mut self, id: &EventId) -> Persistence {
        self.store.remove(id)
    }

    pub fn clear_all(&mut self) -> Persistence {
        self.store.clear()
    }

    /// The timeline, newest first.
    pub fn timeline(&self) -> Snapshot {
        self.store.snapshot()
    }

    pub fn is_sleeping(&self) -> bool {
        self.store.is_open_sleep_active()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn daily_stats(&self) -> BabyStats {
        self.daily_stats_at(Utc::now())
    }

    pub fn daily_stats_at(&self, now: DateTime<Utc>) -> BabyStats {
        daily_stats(&self.store.snapshot(), now, &self.tz, &self.stats)
    }

    pub fn sleep_trend(&self) -> SleepTrend {
        self.sleep_trend_at(Utc::now())
    }

    pub fn sleep_trend_at(&self, now: DateTime<Utc>) -> SleepTrend {
        sleep_trend(&self.store.snapshot(), now, &self.tz, &self.stats)
    }

    /// Rewrites the persisted timeline.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush().context("failed to persist timeline")
    }

    pub fn storage(&self) -> &S {
        self.store.storage()
    }
}

impl<S: SnapshotStorage, Tz: TimeZone> Drop for Tracker<S, Tz> {
    fn drop(&mut self) {
        if !self.store.is_dirty() {
            return;
        }
        if self.store.is_loading() {
            warn!("tracker dropped before load; entries logged since are not saved");
            return;
        }
        match self.store.flush() {
            Ok(()) => debug!("flushed timeline on shutdown"),
            Err(err) => warn!(error = %err, "failed to flush timeline on shutdown"),
        }
    }
}
