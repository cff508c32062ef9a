//! Pearson correlations between session metrics.
//!
//! Every correlation returns `None` rather than a number when the input is
//! degenerate: fewer than two paired samples, or zero variance in either
//! series. Callers must keep that distinct from a correlation of 0.

use crate::models::Session;
use crate::stats::{mean, round4, rushing_index};

/// Composure against match outcome (win = 1, loss = 0). Sessions without a
/// recorded result are skipped.
pub fn correlation_composure_vs_win(items: &[Session]) -> Option<f64> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for s in items {
        let Some(won) = s.is_match_win else {
            continue;
        };
        x.push(f64::from(s.composure));
        y.push(if won { 1.0 } else { 0.0 });
    }
    pearson(&x, &y)
}

/// Rushing index against match outcome.
pub fn correlation_rushing_vs_win(items: &[Session]) -> Option<f64> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for s in items {
        let Some(won) = s.is_match_win else {
            continue;
        };
        x.push(rushing_index(s));
        y.push(if won { 1.0 } else { 0.0 });
    }
    pearson(&x, &y)
}

/// Focus adherence (yes = 1, partial = 0.5, no = 0) against rushing index.
/// Sessions with no focus value, or an unrecognized one, are skipped.
pub fn correlation_followed_focus_vs_rushing(items: &[Session]) -> Option<f64> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for s in items {
        let Some(raw) = s.followed_focus.as_deref() else {
            continue;
        };
        let Some(value) = followed_focus_numeric(raw) else {
            continue;
        };
        x.push(value);
        y.push(rushing_index(s));
    }
    pearson(&x, &y)
}

/// Long-rally count against match outcome.
pub fn correlation_long_rallies_vs_win(items: &[Session]) -> Option<f64> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for s in items {
        let Some(won) = s.is_match_win else {
            continue;
        };
        x.push(f64::from(s.long_rallies));
        y.push(if won { 1.0 } else { 0.0 });
    }
    pearson(&x, &y)
}

fn followed_focus_numeric(v: &str) -> Option<f64> {
    match v {
        "yes" => Some(1.0),
        "partial" => Some(0.5),
        "no" => Some(0.0),
        _ => None,
    }
}

/// Pearson correlation coefficient, rounded to 4 decimal places.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for i in 0..x.len() {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }
    if den_x == 0.0 || den_y == 0.0 {
        return None;
    }
    Some(round4(num / (den_x.sqrt() * den_y.sqrt())))
}
