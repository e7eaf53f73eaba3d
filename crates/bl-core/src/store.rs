//! The event timeline store.
//!
//! [`EventStore`] owns the ordered log, applies the sleep/wake pairing rule on
//! insert and writes a full snapshot through a [`SnapshotStorage`] after every
//! mutation.
//!
//! # Pairing
//!
//! - A wake closes the most recently inserted open sleep, freezing its end and
//!   `duration_minutes`. With no open sleep the wake is kept as an orphan.
//! - A sleep gets its start filled from `occurred_at` when missing. If another
//!   sleep is still open it is closed at the new sleep's start, so at most one
//!   session is ever open.
//! - Removal never re-pairs neighbours; orphans left behind are expected.
//!
//! # Durability
//!
//! The in-memory log is authoritative. A failed write is reported through
//! [`Persistence::Failed`] and leaves the store dirty; it is never rolled back
//! or retried automatically. An unreadable snapshot loads as an empty log.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::event_type::EventType;
use crate::types::EventId;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from reading or writing the persisted snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend could not be read.
    #[error("failed to read snapshot {key}")]
    Read {
        key: String,
        #[source]
        source: BoxError,
    },
    /// The stored payload is not a valid event log.
    #[error("snapshot {key} is not a valid event log")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The in-memory log could not be encoded.
    #[error("failed to serialize event log")]
    Serialize(#[source] serde_json::Error),
    /// The storage backend rejected the write.
    #[error("failed to write snapshot {key}")]
    Write {
        key: String,
        #[source]
        source: BoxError,
    },
    /// The storage backend could not erase the snapshot.
    #[error("failed to remove snapshot {key}")]
    Remove {
        key: String,
        #[source]
        source: BoxError,
    },
}

/// A key/value blob store holding serialized snapshots.
///
/// Implementations must make `write` replace any previous payload for the key
/// (last write wins).
pub trait SnapshotStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the payload stored under `key`, or `None` if absent.
    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Replaces the payload stored under `key`.
    fn write(&mut self, key: &str, payload: &str) -> Result<(), Self::Error>;

    /// Erases `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), Self::Error>;
}

/// Process-local storage, mostly for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    blobs: HashMap<String, String>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStorage for MemoryStorage {
    type Error = std::convert::Infallible;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write(&mut self, key: &str, payload: &str) -> Result<(), Self::Error> {
        self.blobs.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.blobs.remove(key);
        Ok(())
    }
}

/// Outcome of a mutation. The in-memory log reflects the change in every case
/// except [`Persistence::Unchanged`].
#[must_use]
#[derive(Debug)]
pub enum Persistence {
    /// The new snapshot was written.
    Saved,
    /// Nothing changed, so nothing was written.
    Unchanged,
    /// The store has not been loaded yet; the write happens on `load`.
    Deferred,
    /// The write failed. The change is kept in memory.
    Failed(StoreError),
}

impl Persistence {
    #[must_use]
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }

    /// The non-fatal persistence failure, if any.
    #[must_use]
    pub const fn warning(&self) -> Option<&StoreError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Converts a failure into an `Err`, for callers that want to propagate it.
    pub fn into_result(self) -> Result<(), StoreError> {
        match self {
            Self::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}

/// Immutable view of the log, newest first.
///
/// Cheap to clone; later mutations of the store do not affect it.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<[Event]>);

impl Snapshot {
    fn from_log(events: &[Event]) -> Self {
        let mut ordered: Vec<Event> = events.iter().rev().cloned().collect();
        // Stable sort keeps the most recently inserted first among equal timestamps.
        ordered.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Self(ordered.into())
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self(Vec::new().into())
    }
}

impl Deref for Snapshot {
    type Target = [Event];

    fn deref(&self) -> &[Event] {
        &self.0
    }
}

/// Owner of the event log. See the [module documentation](self).
#[derive(Debug)]
pub struct EventStore<S> {
    storage: S,
    key: String,
    /// Insertion order, oldest first. This is also the persisted order.
    events: Vec<Event>,
    snapshot: Snapshot,
    loading: bool,
    dirty: bool,
}

impl<S: SnapshotStorage> EventStore<S> {
    /// Creates an unloaded store backed by `storage` under `key`.
    ///
    /// Call [`load`](Self::load) before use. Mutations made earlier stay in
    /// memory and are replayed after the restored log.
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            events: Vec::new(),
            snapshot: Snapshot::default(),
            loading: true,
            dirty: false,
        }
    }

    /// Creates a store and immediately restores the persisted log.
    pub fn open(storage: S, key: impl Into<String>) -> Self {
        let mut store = Self::new(storage, key);
        store.load();
        store
    }

    /// Restores the last persisted snapshot and returns how many events it held.
    ///
    /// An absent snapshot is an empty log. An unreadable or malformed one is
    /// logged and discarded, also yielding an empty log. Events added before
    /// the load are replayed through the pairing rule after the restored log;
    /// those whose id was restored are dropped.
    pub fn load(&mut self) -> usize {
        let restored = match self.read_persisted() {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, cause = %error_chain(&err), "discarding persisted event log");
                Vec::new()
            }
        };
        let count = restored.len();
        let pending = std::mem::replace(&mut self.events, restored);
        self.loading = false;
        for mut event in pending {
            if self.get(&event.id).is_some() {
                warn!(id = %event.id, "dropping event logged before load; id already restored");
                continue;
            }
            self.pair(&mut event);
            self.events.push(event);
        }
        self.refresh_snapshot();
        info!(count, total = self.events.len(), key = %self.key, "loaded event log");

        if self.dirty {
            if let Err(err) = self.flush() {
                warn!(error = %err, "failed to persist events logged before load");
            }
        }
        count
    }

    fn read_persisted(&self) -> Result<Vec<Event>, StoreError> {
        let payload = self
            .storage
            .read(&self.key)
            .map_err(|source| StoreError::Read {
                key: self.key.clone(),
                source: Box::new(source),
            })?;
        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&payload).map_err(|source| StoreError::Parse {
            key: self.key.clone(),
            source,
        })
    }

    /// Inserts an event, applying the pairing rule, then persists.
    ///
    /// An event whose id is already present is ignored.
    pub fn add(&mut self, mut event: Event) -> Persistence {
        if self.get(&event.id).is_some() {
            warn!(id = %event.id, "ignoring event with duplicate id");
            return Persistence::Unchanged;
        }

        self.pair(&mut event);
        debug!(id = %event.id, kind = %event.event_type(), "adding event");
        self.events.push(event);
        self.commit()
    }

    /// Applies the pairing rule for `event` against the current log.
    fn pair(&mut self, event: &mut Event) {
        match event.event_type() {
            EventType::Wake => self.pair_wake(event),
            EventType::Sleep => {
                event.ensure_sleep_start();
                if let Some(start) = event.sleep_start() {
                    self.supersede_open_sleep(&event.id, start);
                }
            }
            EventType::Feed | EventType::Diaper => {}
        }
    }

    fn pair_wake(&mut self, wake: &Event) {
        let Some(sleep) = self.events.iter_mut().rev().find(|e| e.is_open_sleep()) else {
            debug!(id = %wake.id, "wake without open sleep recorded as orphan");
            return;
        };
        if let Some(minutes) = sleep.close_sleep(wake.occurred_at) {
            debug!(sleep = %sleep.id, wake = %wake.id, minutes, "closed sleep session");
        }
    }

    fn supersede_open_sleep(&mut self, new_id: &EventId, start: DateTime<Utc>) {
        let Some(sleep) = self.events.iter_mut().rev().find(|e| e.is_open_sleep()) else {
            return;
        };
        if let Some(minutes) = sleep.close_sleep(start) {
            info!(
                sleep = %sleep.id,
                superseded_by = %new_id,
                minutes,
                "closed open sleep at start of new sleep"
            );
        }
    }

    /// Deletes the event with `id`. Neighbouring events are left as they are.
    pub fn remove(&mut self, id: &EventId) -> Persistence {
        let Some(index) = self.events.iter().position(|e| &e.id == id) else {
            debug!(%id, "remove of unknown event ignored");
            return Persistence::Unchanged;
        };
        let removed = self.events.remove(index);
        debug!(%id, kind = %removed.event_type(), "removed event");
        self.commit()
    }

    /// Empties the log and erases the persisted snapshot.
    pub fn clear(&mut self) -> Persistence {
        let count = self.events.len();
        self.events.clear();
        self.refresh_snapshot();
        self.dirty = false;
        info!(count, "cleared event log");

        match self.storage.remove(&self.key) {
            Ok(()) => Persistence::Saved,
            Err(source) => {
                let err = StoreError::Remove {
                    key: self.key.clone(),
                    source: Box::new(source),
                };
                warn!(error = %err, cause = %error_chain(&err), "failed to erase persisted event log");
                // The stored snapshot is stale; a later flush overwrites it.
                self.dirty = true;
                Persistence::Failed(err)
            }
        }
    }

    /// Writes the current log unconditionally.
    ///
    /// Does nothing before [`load`](Self::load), to avoid clobbering the
    /// stored snapshot.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.loading {
            debug!("flush before load skipped");
            return Ok(());
        }
        let payload = serde_json::to_string(&self.events).map_err(StoreError::Serialize)?;
        self.storage
            .write(&self.key, &payload)
            .map_err(|source| StoreError::Write {
                key: self.key.clone(),
                source: Box::new(source),
            })?;
        self.dirty = false;
        Ok(())
    }

    fn commit(&mut self) -> Persistence {
        self.refresh_snapshot();
        if self.loading {
            self.dirty = true;
            return Persistence::Deferred;
        }
        match self.flush() {
            Ok(()) => Persistence::Saved,
            Err(err) => {
                warn!(error = %err, cause = %error_chain(&err), "failed to persist event log");
                self.dirty = true;
                Persistence::Failed(err)
            }
        }
    }

    fn refresh_snapshot(&mut self) {
        self.snapshot = Snapshot::from_log(&self.events);
    }
}

impl<S> EventStore<S> {
    /// The current log, newest first.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.clone()
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// The open sleep session, if the baby is currently asleep.
    pub fn open_sleep(&self) -> Option<&Event> {
        self.events.iter().rev().find(|e| e.is_open_sleep())
    }

    pub fn is_open_sleep_active(&self) -> bool {
        self.open_sleep().is_some()
    }

    /// True until [`EventStore::load`] has completed.
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// True when the persisted snapshot lags behind memory.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(": ")
    }
}
