//! Materialized statistics rows.
//!
//! Projection outputs, recomputed from the live session set after every sync
//! push or create. Never merged in place: each recompute replaces the rows
//! wholesale. Averages are stored already rounded to 4 decimal places.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_sessions: u32,
    pub total_matches: u32,
    /// Wins over match sessions with a recorded result.
    pub win_rate: f64,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    /// Total unforced errors over total minutes played.
    pub avg_unforced_errors_per_min: f64,
    /// OLS slope of composure over days since the first session.
    pub improvement_slope_composure: f64,
    /// OLS slope of rushing index over days since the first session.
    pub improvement_slope_rushing: f64,
    pub last_calculated_at: DateTime<Utc>,
}

impl Default for UserStats {
    fn default() -> Self {
        UserStats {
            total_sessions: 0,
            total_matches: 0,
            win_rate: 0.0,
            avg_composure: 0.0,
            avg_rushing_index: 0.0,
            avg_unforced_errors_per_min: 0.0,
            improvement_slope_composure: 0.0,
            improvement_slope_rushing: 0.0,
            last_calculated_at: DateTime::UNIX_EPOCH,
        }
    }
}

/// Aggregate record against a single opponent, over match sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentStats {
    pub matches_played: u32,
    pub win_rate: f64,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    /// Average of per-match set differentials (games won minus lost).
    pub avg_set_differential: f64,
    pub last_calculated_at: DateTime<Utc>,
}

impl Default for OpponentStats {
    fn default() -> Self {
        OpponentStats {
            matches_played: 0,
            win_rate: 0.0,
            avg_composure: 0.0,
            avg_rushing_index: 0.0,
            avg_set_differential: 0.0,
            last_calculated_at: DateTime::UNIX_EPOCH,
        }
    }
}

/// One Monday-start UTC week of activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyStats {
    pub week_start_date: DateTime<Utc>,
    pub avg_composure: f64,
    pub avg_rushing_index: f64,
    pub win_rate: f64,
    pub matches_played: u32,
    pub last_calculated_at: DateTime<Utc>,
}
