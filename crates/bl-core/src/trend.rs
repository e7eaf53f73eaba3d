//! Rolling sleep totals for charting.
//!
//! Sessions are attributed the same way as in [`crate::daily`]: to the local
//! date of their start, with an open session counting up to `now` only when it
//! started today.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::config::StatsConfig;
use crate::event::Event;
use crate::session::{Recorded, in_progress, local_date, recorded};

const MINUTES_PER_HOUR: f64 = 60.0;

/// One day of the sleep series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// Chart label, `day/month` without padding (`"5/12"`).
    pub label: String,
    pub hours: f64,
}

impl TrendPoint {
    fn new(date: NaiveDate, hours: f64) -> Self {
        Self {
            date,
            label: format!("{}/{}", date.day(), date.month()),
            hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepTrend {
    /// Hours of sleep in sessions that ended inside the rolling window.
    pub rolling_total_hours: f64,
    /// Per-day hours, oldest first.
    pub daily_series: Vec<TrendPoint>,
}

/// Computes the rolling total and the per-day series at `now`.
///
/// A closed session counts towards the rolling total when its end falls
/// after `now - trend_window_hours`, and towards the series when its end falls
/// after `now - trend_days`. With `fill_empty_days` the series has a point for
/// every day from `trend_days - 1` days ago through today; a session started
/// outside that range still gets its own point. Out-of-range settings are
/// clamped (see [`StatsConfig::validate`]).
#[allow(clippy::cast_precision_loss)]
pub fn sleep_trend<Tz: TimeZone>(
    events: &[Event],
    now: DateTime<Utc>,
    tz: &Tz,
    config: &StatsConfig,
) -> SleepTrend {
    let days = config.series_days();
    let window_start = now
        .checked_sub_signed(Duration::hours(config.window_hours()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let series_start = now
        .checked_sub_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut rolling_minutes = 0.0;
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for event in events {
        let Some(session) = event.sleep() else {
            continue;
        };
        let Recorded::Closed { end, minutes } = recorded(session) else {
            continue;
        };
        let minutes = minutes as f64;
        if end > window_start {
            rolling_minutes += minutes;
        }
        if end > series_start {
            *daily.entry(local_date(event.anchor(), tz)).or_default() += minutes;
        }
    }

    if let Some(progress) = in_progress(events, now, tz) {
        rolling_minutes += progress.minutes;
        *daily.entry(progress.date).or_default() += progress.minutes;
    }

    if config.fill_empty_days {
        let today = local_date(now, tz);
        let first_day = today
            .checked_sub_signed(Duration::days(days - 1))
            .unwrap_or(NaiveDate::MIN);
        for date in first_day.iter_days().take_while(|d| *d <= today) {
            daily.entry(date).or_default();
        }
    }

    SleepTrend {
        rolling_total_hours: rolling_minutes / MINUTES_PER_HOUR,
        daily_series: daily
            .into_iter()
            .map(|(date, minutes)| TrendPoint::new(date, minutes / MINUTES_PER_HOUR))
            .collect(),
    }
}
