//! Tunables shared by the aggregators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest sleep series, in days.
pub const MAX_TREND_DAYS: i64 = 366;

/// Widest rolling sleep window, in hours.
pub const MAX_TREND_WINDOW_HOURS: i64 = MAX_TREND_DAYS * 24;

/// A [`StatsConfig`] value outside its supported range.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsConfigError {
    #[error("trend_days must be between 1 and 366, got {0}")]
    TrendDays(i64),

    #[error("trend_window_hours must be between 1 and 8784, got {0}")]
    TrendWindowHours(i64),

    #[error("wake_window_fallback_minutes must be a non-negative number, got {0}")]
    WakeWindowFallback(f64),
}

/// Configuration for statistics derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Average wake window reported when no wake window has been observed.
    /// Default: 60 minutes.
    pub wake_window_fallback_minutes: f64,

    /// Width of the rolling sleep total.
    /// Default: 24 hours.
    pub trend_window_hours: i64,

    /// Number of days covered by the sleep series.
    /// Default: 7 days.
    pub trend_days: i64,

    /// Emit zero-hour points for days without sleep so the series is
    /// continuous. Default: true.
    pub fill_empty_days: bool,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            wake_window_fallback_minutes: 60.0,
            trend_window_hours: 24,
            trend_days: 7,
            fill_empty_days: true,
        }
    }
}

impl StatsConfig {
    /// Checks every field against its supported range.
    pub fn validate(&self) -> Result<(), StatsConfigError> {
        if !(1..=MAX_TREND_DAYS).contains(&self.trend_days) {
            return Err(StatsConfigError::TrendDays(self.trend_days));
        }
        if !(1..=MAX_TREND_WINDOW_HOURS).contains(&self.trend_window_hours) {
            return Err(StatsConfigError::TrendWindowHours(self.trend_window_hours));
        }
        if !(self.wake_window_fallback_minutes.is_finite()
            && self.wake_window_fallback_minutes >= 0.0)
        {
            return Err(StatsConfigError::WakeWindowFallback(
                self.wake_window_fallback_minutes,
            ));
        }
        Ok(())
    }

    /// `trend_days` forced into range, for configs that skipped validation.
    pub(crate) fn series_days(&self) -> i64 {
        self.trend_days.clamp(1, MAX_TREND_DAYS)
    }

    /// `trend_window_hours` forced into range.
    pub(crate) fn window_hours(&self) -> i64 {
        self.trend_window_hours.clamp(1, MAX_TREND_WINDOW_HOURS)
    }
}
