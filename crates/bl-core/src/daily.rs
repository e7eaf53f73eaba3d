//! Per-day statistics over the event log.
//!
//! # Algorithm Summary
//!
//! 1. Sort events by `occurred_at` ascending (snapshots arrive newest first)
//! 2. Bucket each event by the local date of its anchor (sleep start, or
//!    `occurred_at` for everything else)
//! 3. Count feeds and diapers, add closed sleep durations, and pair each wake
//!    with the next sleep start to sample wake windows
//! 4. Credit the open session's elapsed time to today if it started today
//! 5. Average over the known day buckets
//!
//! Everything is recomputed from scratch on each call; logs are small.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::StatsConfig;
use crate::event::{Event, EventKind};
use crate::session::{Recorded, elapsed_minutes, in_progress, local_date, recorded};

/// Totals for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    /// Closed sessions plus, for today, the elapsed part of an open one.
    pub total_sleep_minutes: f64,
    pub feed_count: u32,
    pub diaper_count: u32,
    /// Closed sleep events attributed to this day, oldest first.
    pub sleep_sessions: Vec<Event>,
    /// Gaps between a wake and the following sleep start.
    pub wake_windows_minutes: Vec<f64>,
}

impl DailyStats {
    #[must_use]
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_sleep_minutes: 0.0,
            feed_count: 0,
            diaper_count: 0,
            sleep_sessions: Vec::new(),
            wake_windows_minutes: Vec::new(),
        }
    }
}

/// Day buckets plus multi-day averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BabyStats {
    /// Known days, newest first.
    pub per_day: Vec<DailyStats>,
    /// Always present, even with no events today.
    pub today: DailyStats,
    pub average_sleep_minutes_per_day: f64,
    pub average_feeds_per_day: f64,
    pub average_diapers_per_day: f64,
    /// Falls back to [`StatsConfig::wake_window_fallback_minutes`] when no
    /// wake window has been observed.
    pub average_wake_window_minutes: f64,
    /// Sleep events left out of the totals because their end and duration
    /// are inconsistent.
    pub skipped_events: usize,
}

/// Computes per-day statistics for `events` as seen at `now` in `tz`.
#[allow(clippy::cast_precision_loss)]
pub fn daily_stats<Tz: TimeZone>(
    events: &[Event],
    now: DateTime<Utc>,
    tz: &Tz,
    config: &StatsConfig,
) -> BabyStats {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.occurred_at);

    let mut days: BTreeMap<NaiveDate, DailyStats> = BTreeMap::new();
    let mut last_wake: Option<DateTime<Utc>> = None;
    let mut skipped_events = 0;

    for event in sorted {
        let date = local_date(event.anchor(), tz);
        let day = days
            .entry(date)
            .or_insert_with(|| DailyStats::empty(date));

        match &event.kind {
            EventKind::Feed => day.feed_count += 1,
            EventKind::Diaper => day.diaper_count += 1,
            EventKind::Sleep(session) => {
                match recorded(session) {
                    Recorded::Closed { minutes, .. } => {
                        day.total_sleep_minutes += minutes as f64;
                        day.sleep_sessions.push(event.clone());
                    }
                    Recorded::Open => {}
                    Recorded::Malformed => {
                        debug!(id = %event.id, "skipping sleep with inconsistent end/duration");
                        skipped_events += 1;
                    }
                }
                let window = last_wake
                    .take()
                    .zip(event.sleep_start())
                    .filter(|(wake, start)| start >= wake);
                if let Some((wake, start)) = window {
                    day.wake_windows_minutes.push(elapsed_minutes(wake, start));
                }
            }
            EventKind::Wake => last_wake = Some(event.occurred_at),
        }
    }

    if let Some(progress) = in_progress(events, now, tz) {
        debug!(id = %progress.event.id, minutes = progress.minutes, "crediting open sleep to today");
        days.entry(progress.date)
            .or_insert_with(|| DailyStats::empty(progress.date))
            .total_sleep_minutes += progress.minutes;
    }

    let today_date = local_date(now, tz);
    let today = days
        .get(&today_date)
        .cloned()
        .unwrap_or_else(|| DailyStats::empty(today_date));

    let num_days = days.len().max(1) as f64;
    let total_sleep: f64 = days.values().map(|d| d.total_sleep_minutes).sum();
    let total_feeds: u32 = days.values().map(|d| d.feed_count).sum();
    let total_diapers: u32 = days.values().map(|d| d.diaper_count).sum();

    let wake_windows: Vec<f64> = days
        .values()
        .flat_map(|d| d.wake_windows_minutes.iter().copied())
        .collect();
    let average_wake_window_minutes = if wake_windows.is_empty() {
        config.wake_window_fallback_minutes
    } else {
        wake_windows.iter().sum::<f64>() / wake_windows.len() as f64
    };

    BabyStats {
        per_day: days.into_values().rev().collect(),
        today,
        average_sleep_minutes_per_day: total_sleep / num_days,
        average_feeds_per_day: f64::from(total_feeds) / num_days,
        average_diapers_per_day: f64::from(total_diapers) / num_days,
        average_wake_window_minutes,
        skipped_events,
    }
}
