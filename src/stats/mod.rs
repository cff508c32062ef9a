//! Stateless statistics engine.
//!
//! Pure functions over in-memory slices of sessions and match sets. Nothing
//! here touches storage: callers load a snapshot, the engine aggregates it.
//! Degenerate input (empty slices, zero duration, fewer than two samples) is
//! always a defined fallback value, never an error, so a partial dataset can
//! never fail a projection recompute.

pub mod calculators;
pub mod correlations;
pub mod deep;

pub use calculators::*;
pub use correlations::*;
pub use deep::*;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Time-bucket width for trend and insight aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Week,
    Month,
}

impl Granularity {
    /// Parse a query-string value. Anything other than `month` falls back
    /// to weekly bucketing.
    pub fn from_param(raw: &str) -> Self {
        if raw == "month" {
            Granularity::Month
        } else {
            Granularity::Week
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Week => write!(f, "week"),
            Granularity::Month => write!(f, "month"),
        }
    }
}

/// Round to 4 decimal places, half away from zero.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Monday 00:00:00 UTC of the week containing `t`.
pub fn week_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let date = t.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// Start of the bucket containing `t`: first of the month for monthly
/// granularity, otherwise the Monday week start.
pub fn bucket_start(t: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Month => {
            let date = t.date_naive();
            let first = date - Duration::days(i64::from(date.day0()));
            first.and_time(NaiveTime::MIN).and_utc()
        }
        Granularity::Week => week_start(t),
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. 0 below two samples.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values
        .iter()
        .map(|v| {
            let d = v - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}
