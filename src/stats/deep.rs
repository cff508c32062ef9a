//! Deep behavioral insight report.
//!
//! A compound aggregate over one user's sessions: how match play differs
//! from class work, where composure sits relative to outcomes, whether the
//! player holds up in tight matches or the day after a long one. Competitive
//! sessions (kind `match` or `friendly`) carry the match side of every
//! comparison; the strict `match` kind with a recorded result is what counts
//! as a match inside a metric.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{MatchSet, Session, SessionKind};
use crate::stats::{
    average_composure, average_rushing_index, bucket_start, improvement_slope_composure,
    improvement_slope_rushing, round4, rushing_index, set_differential, std_dev, week_start,
    win_rate, Granularity,
};

/// Summary of one group of sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightMetric {
    pub sessions: u32,
    /// Match-kind sessions with a recorded result.
    pub matches: u32,
    pub avg_rushing_index: f64,
    pub avg_composure: f64,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorDrift {
    pub class: InsightMetric,
    /// Competitive sessions: matches and friendlies.
    #[serde(rename = "match")]
    pub competitive: InsightMetric,
    pub delta_rushing_index: f64,
    pub delta_composure: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComposureThresholds {
    pub low: InsightMetric,
    pub mid: InsightMetric,
    pub high: InsightMetric,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FocusAdherence {
    pub yes: InsightMetric,
    pub partial: InsightMetric,
    pub no: InsightMetric,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarTrendPoint {
    pub bucket_start_date: DateTime<Utc>,
    pub value: f64,
    pub sessions: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDifferentialTrendPoint {
    pub bucket_start_date: DateTime<Utc>,
    pub avg_set_differential: f64,
    pub matches: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpponentBehaviorShift {
    pub opponent_id: Uuid,
    pub opponent_name: String,
    pub matches: u32,
    pub avg_rushing_index: f64,
    pub avg_composure: f64,
    pub avg_set_differential: f64,
    pub rushing_slope: f64,
    pub composure_slope: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyVolatilityPoint {
    pub week_start_date: DateTime<Utc>,
    pub composure_std_dev: f64,
    pub rushing_std_dev: f64,
    pub sessions: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClutchIndicator {
    pub clutch_matches: u32,
    pub clutch_matches_with_result: u32,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FatigueSignal {
    pub adjacent_day_pairs: u32,
    pub avg_next_day_rushing_delta: f64,
    pub avg_next_day_composure_delta: f64,
    pub weekend_pairs: u32,
    /// Omitted, not zero, when no Saturday-to-Sunday pair exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturday_to_sunday_rushing: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepInsights {
    pub granularity: Granularity,
    pub match_vs_class_behavioral_drift: BehaviorDrift,
    pub composure_threshold_analysis: ComposureThresholds,
    pub focus_adherence_impact: FocusAdherence,
    pub rally_density_trend: Vec<ScalarTrendPoint>,
    pub direction_changes_trend: Vec<ScalarTrendPoint>,
    pub set_differential_trend: Vec<SetDifferentialTrendPoint>,
    pub opponent_behavioral_shift: Vec<OpponentBehaviorShift>,
    pub weekly_volatility: Vec<WeeklyVolatilityPoint>,
    pub clutch_indicator: ClutchIndicator,
    pub fatigue_signal: FatigueSignal,
}

/// Build the full report over one user's (non-deleted) sessions.
///
/// `sets_by_session` and `opponent_names` are side-loads; missing entries
/// mean "no sets" and "unknown opponent" respectively.
pub fn build_deep_insights(
    items: &[Session],
    sets_by_session: &HashMap<Uuid, Vec<MatchSet>>,
    opponent_names: &HashMap<Uuid, String>,
    granularity: Granularity,
) -> DeepInsights {
    let class_sessions: Vec<Session> = items
        .iter()
        .filter(|s| s.session_type == SessionKind::Class)
        .cloned()
        .collect();
    let competitive: Vec<Session> = items.iter().filter(|s| s.is_competitive()).cloned().collect();

    let class_metric = build_insight_metric(&class_sessions);
    let competitive_metric = build_insight_metric(&competitive);

    DeepInsights {
        granularity,
        match_vs_class_behavioral_drift: BehaviorDrift {
            delta_rushing_index: round4(
                competitive_metric.avg_rushing_index - class_metric.avg_rushing_index,
            ),
            delta_composure: round4(competitive_metric.avg_composure - class_metric.avg_composure),
            class: class_metric,
            competitive: competitive_metric,
        },
        composure_threshold_analysis: composure_threshold_analysis(items),
        focus_adherence_impact: focus_adherence_impact(items),
        rally_density_trend: build_rate_trend(items, granularity, |s| {
            if s.duration_minutes <= 0 {
                0.0
            } else {
                f64::from(s.long_rallies) / f64::from(s.duration_minutes)
            }
        }),
        direction_changes_trend: build_rate_trend(items, granularity, |s| {
            if s.duration_minutes <= 0 {
                0.0
            } else {
                f64::from(s.direction_changes) / f64::from(s.duration_minutes)
            }
        }),
        set_differential_trend: set_differential_trend(&competitive, sets_by_session, granularity),
        opponent_behavioral_shift: opponent_behavioral_shift(
            &competitive,
            sets_by_session,
            opponent_names,
        ),
        weekly_volatility: weekly_volatility(items),
        clutch_indicator: clutch_indicator(&competitive, sets_by_session),
        fatigue_signal: fatigue_signal(items),
    }
}

fn build_insight_metric(items: &[Session]) -> InsightMetric {
    let matches_with_result: Vec<Session> = items
        .iter()
        .filter(|s| s.is_match() && s.is_match_win.is_some())
        .cloned()
        .collect();
    InsightMetric {
        sessions: items.len() as u32,
        matches: matches_with_result.len() as u32,
        avg_rushing_index: round4(average_rushing_index(items)),
        avg_composure: round4(average_composure(items)),
        win_rate: round4(win_rate(&matches_with_result)),
    }
}

fn composure_threshold_analysis(items: &[Session]) -> ComposureThresholds {
    let mut low = Vec::new();
    let mut mid = Vec::new();
    let mut high = Vec::new();
    for item in items {
        if item.composure < 5 {
            low.push(item.clone());
        } else if item.composure <= 7 {
            mid.push(item.clone());
        } else {
            high.push(item.clone());
        }
    }
    ComposureThresholds {
        low: build_insight_metric(&low),
        mid: build_insight_metric(&mid),
        high: build_insight_metric(&high),
    }
}

fn focus_adherence_impact(items: &[Session]) -> FocusAdherence {
    let mut yes = Vec::new();
    let mut partial = Vec::new();
    let mut no = Vec::new();
    for item in items {
        match item.followed_focus.as_deref() {
            Some("yes") => yes.push(item.clone()),
            Some("partial") => partial.push(item.clone()),
            Some("no") => no.push(item.clone()),
            _ => {}
        }
    }
    FocusAdherence {
        yes: build_insight_metric(&yes),
        partial: build_insight_metric(&partial),
        no: build_insight_metric(&no),
    }
}

fn build_rate_trend<F>(
    items: &[Session],
    granularity: Granularity,
    rate: F,
) -> Vec<ScalarTrendPoint>
where
    F: Fn(&Session) -> f64,
{
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, u32)> = BTreeMap::new();
    for item in items {
        let entry = buckets.entry(bucket_start(item.date, granularity)).or_default();
        entry.0 += rate(item);
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(key, (total, sessions))| ScalarTrendPoint {
            bucket_start_date: key,
            value: round4(total / f64::from(sessions)),
            sessions,
        })
        .collect()
}

fn set_differential_trend(
    competitive: &[Session],
    sets_by_session: &HashMap<Uuid, Vec<MatchSet>>,
    granularity: Granularity,
) -> Vec<SetDifferentialTrendPoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, (i64, u32)> = BTreeMap::new();
    for item in competitive {
        let diff = sets_by_session
            .get(&item.id)
            .map(|sets| set_differential(sets))
            .unwrap_or(0);
        let entry = buckets.entry(bucket_start(item.date, granularity)).or_default();
        entry.0 += i64::from(diff);
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(key, (total, matches))| SetDifferentialTrendPoint {
            bucket_start_date: key,
            avg_set_differential: round4(total as f64 / f64::from(matches)),
            matches,
        })
        .collect()
}

fn opponent_behavioral_shift(
    competitive: &[Session],
    sets_by_session: &HashMap<Uuid, Vec<MatchSet>>,
    opponent_names: &HashMap<Uuid, String>,
) -> Vec<OpponentBehaviorShift> {
    let mut by_opponent: HashMap<Uuid, Vec<Session>> = HashMap::new();
    for item in competitive {
        if let Some(opponent_id) = item.opponent_id {
            by_opponent.entry(opponent_id).or_default().push(item.clone());
        }
    }

    let mut out = Vec::new();
    for (opponent_id, items) in &by_opponent {
        if items.len() < 2 {
            continue;
        }
        let total_diff: i64 = items
            .iter()
            .map(|s| {
                i64::from(
                    sets_by_session
                        .get(&s.id)
                        .map(|sets| set_differential(sets))
                        .unwrap_or(0),
                )
            })
            .sum();
        let name = opponent_names
            .get(opponent_id)
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| opponent_id.to_string());

        out.push(OpponentBehaviorShift {
            opponent_id: *opponent_id,
            opponent_name: name,
            matches: items.len() as u32,
            avg_rushing_index: round4(average_rushing_index(items)),
            avg_composure: round4(average_composure(items)),
            avg_set_differential: round4(total_diff as f64 / items.len() as f64),
            rushing_slope: round4(improvement_slope_rushing(items)),
            composure_slope: round4(improvement_slope_composure(items)),
        });
    }

    out.sort_by(|a, b| {
        b.matches
            .cmp(&a.matches)
            .then_with(|| a.opponent_name.cmp(&b.opponent_name))
    });
    out
}

fn weekly_volatility(items: &[Session]) -> Vec<WeeklyVolatilityPoint> {
    let mut by_week: BTreeMap<DateTime<Utc>, Vec<&Session>> = BTreeMap::new();
    for item in items {
        by_week.entry(week_start(item.date)).or_default().push(item);
    }
    by_week
        .into_iter()
        .map(|(week, week_items)| {
            let composure: Vec<f64> =
                week_items.iter().map(|s| f64::from(s.composure)).collect();
            let rushing: Vec<f64> = week_items.iter().map(|s| rushing_index(s)).collect();
            WeeklyVolatilityPoint {
                week_start_date: week,
                composure_std_dev: round4(std_dev(&composure)),
                rushing_std_dev: round4(std_dev(&rushing)),
                sessions: week_items.len() as u32,
            }
        })
        .collect()
}

fn clutch_indicator(
    competitive: &[Session],
    sets_by_session: &HashMap<Uuid, Vec<MatchSet>>,
) -> ClutchIndicator {
    let mut clutch_matches = 0u32;
    let mut with_result = 0u32;
    let mut wins = 0u32;
    for item in competitive {
        let diff = sets_by_session
            .get(&item.id)
            .map(|sets| set_differential(sets))
            .unwrap_or(0);
        if diff.abs() > 2 {
            continue;
        }
        clutch_matches += 1;
        if let Some(won) = item.is_match_win {
            with_result += 1;
            if won {
                wins += 1;
            }
        }
    }
    let win_rate = if with_result > 0 {
        round4(f64::from(wins) / f64::from(with_result))
    } else {
        0.0
    };
    ClutchIndicator {
        clutch_matches,
        clutch_matches_with_result: with_result,
        win_rate,
    }
}

fn fatigue_signal(items: &[Session]) -> FatigueSignal {
    if items.len() < 2 {
        return FatigueSignal::default();
    }
    let mut sorted: Vec<&Session> = items.iter().collect();
    sorted.sort_by_key(|s| s.date);

    let mut adjacent_pairs = 0u32;
    let mut total_rushing_delta = 0.0;
    let mut total_composure_delta = 0.0;
    let mut weekend_pairs = 0u32;
    let mut total_weekend_rushing_delta = 0.0;

    for pair in sorted.windows(2) {
        let (curr, next) = (pair[0], pair[1]);
        let curr_day = curr.date.date_naive();
        let next_day = next.date.date_naive();
        if (next_day - curr_day).num_days() != 1 {
            continue;
        }
        adjacent_pairs += 1;
        let rushing_delta = rushing_index(next) - rushing_index(curr);
        total_rushing_delta += rushing_delta;
        total_composure_delta += f64::from(next.composure - curr.composure);

        if curr_day.weekday() == Weekday::Sat && next_day.weekday() == Weekday::Sun {
            weekend_pairs += 1;
            total_weekend_rushing_delta += rushing_delta;
        }
    }

    let mut out = FatigueSignal {
        adjacent_day_pairs: adjacent_pairs,
        weekend_pairs,
        ..Default::default()
    };
    if adjacent_pairs > 0 {
        out.avg_next_day_rushing_delta = round4(total_rushing_delta / f64::from(adjacent_pairs));
        out.avg_next_day_composure_delta =
            round4(total_composure_delta / f64::from(adjacent_pairs));
    }
    if weekend_pairs > 0 {
        out.saturday_to_sunday_rushing =
            Some(round4(total_weekend_rushing_delta / f64::from(weekend_pairs)));
    }
    out
}
