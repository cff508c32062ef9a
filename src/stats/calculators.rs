//! Scalar calculators over sessions and match sets.

use crate::models::{MatchSet, Session};

/// Rushed shots plus unforced errors per minute of play. 0 when the
/// session has no recorded duration.
pub fn rushing_index(s: &Session) -> f64 {
    if s.duration_minutes <= 0 {
        return 0.0;
    }
    f64::from(s.rushed_shots + s.unforced_errors) / f64::from(s.duration_minutes)
}

/// Wins over sessions with a recorded result. A `None` result means the
/// player never logged the outcome and the session does not count against
/// them; `Some(false)` is a loss and does. 0 when nothing has a result.
pub fn win_rate(items: &[Session]) -> f64 {
    let mut wins = 0u32;
    let mut with_result = 0u32;
    for item in items {
        match item.is_match_win {
            Some(true) => {
                wins += 1;
                with_result += 1;
            }
            Some(false) => with_result += 1,
            None => {}
        }
    }
    if with_result == 0 {
        return 0.0;
    }
    f64::from(wins) / f64::from(with_result)
}

/// Total games won minus games lost over non-deleted sets.
pub fn set_differential(sets: &[MatchSet]) -> i32 {
    sets.iter()
        .filter(|set| !set.is_deleted())
        .map(MatchSet::games_differential)
        .sum()
}

/// Ordinary-least-squares slope of `value` against fractional days since
/// the earliest session. 0 with fewer than two sessions or a degenerate
/// (zero-variance) time axis.
pub fn improvement_slope<F>(items: &[Session], value: F) -> f64
where
    F: Fn(&Session) -> f64,
{
    if items.len() < 2 {
        return 0.0;
    }
    let mut sorted: Vec<&Session> = items.iter().collect();
    sorted.sort_by_key(|s| s.date);
    let baseline = sorted[0].date;

    let x: Vec<f64> = sorted
        .iter()
        .map(|s| (s.date - baseline).num_milliseconds() as f64 / 86_400_000.0)
        .collect();
    let y: Vec<f64> = sorted.iter().map(|s| value(s)).collect();
    linear_regression_slope(&x, &y)
}

pub fn improvement_slope_composure(items: &[Session]) -> f64 {
    improvement_slope(items, |s| f64::from(s.composure))
}

pub fn improvement_slope_rushing(items: &[Session]) -> f64 {
    improvement_slope(items, rushing_index)
}

/// Total unforced errors over total minutes, across sessions.
pub fn avg_unforced_errors_per_min(items: &[Session]) -> f64 {
    let mut total_errors = 0i64;
    let mut total_minutes = 0i64;
    for item in items {
        total_errors += i64::from(item.unforced_errors);
        total_minutes += i64::from(item.duration_minutes);
    }
    if total_minutes == 0 {
        return 0.0;
    }
    total_errors as f64 / total_minutes as f64
}

pub fn average_composure(items: &[Session]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let sum: i64 = items.iter().map(|s| i64::from(s.composure)).sum();
    sum as f64 / items.len() as f64
}

pub fn average_rushing_index(items: &[Session]) -> f64 {
    if items.is_empty() {
        return 0.0;
    }
    let sum: f64 = items.iter().map(rushing_index).sum();
    sum / items.len() as f64
}

fn linear_regression_slope(x: &[f64], y: &[f64]) -> f64 {
    if x.len() != y.len() || x.len() < 2 {
        return 0.0;
    }
    let n = x.len() as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for i in 0..x.len() {
        sum_x += x[i];
        sum_y += y[i];
        sum_xy += x[i] * y[i];
        sum_x2 += x[i] * x[i];
    }
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}
