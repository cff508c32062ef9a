//! Materialized statistics projections.
//!
//! Recomputation is full, not incremental: every run reads the user's
//! complete non-deleted session history and overwrites the stored rows.
//! Same inputs produce the same outputs, so overlapping runs for one user
//! are safe even though the last writer wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::events::{Event, EventHandler};
use crate::models::{OpponentStats, Session, UserStats, WeeklyStats};
use crate::stats::{
    average_composure, average_rushing_index, avg_unforced_errors_per_min,
    improvement_slope_composure, improvement_slope_rushing, round4, set_differential, week_start,
    win_rate,
};
use crate::storage::{StorageError, Store};

/// Errors that can occur while recomputing projections.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Recomputes and persists the derived stats rows for one user.
pub struct ProjectionService {
    store: Arc<dyn Store>,
}

impl ProjectionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Rebuild the user row, every opponent row touched by the user's
    /// matches, and the full weekly set.
    ///
    /// The three writes are not one transaction: a failure partway leaves
    /// the earlier rows committed and fresh while the later ones stay
    /// stale. The error must reach the caller so a retry can finish the
    /// job.
    pub async fn recompute_for_user(&self, user_id: Uuid) -> Result<(), ProjectionError> {
        let all_sessions = self
            .store
            .list_sessions_by_date_range(user_id, None, None)
            .await?;

        let match_sessions: Vec<Session> = all_sessions
            .iter()
            .filter(|s| s.is_match())
            .cloned()
            .collect();

        let now = Utc::now();
        let user_stats = UserStats {
            total_sessions: all_sessions.len() as u32,
            total_matches: match_sessions.len() as u32,
            win_rate: round4(win_rate(&match_sessions)),
            avg_composure: round4(average_composure(&all_sessions)),
            avg_rushing_index: round4(average_rushing_index(&all_sessions)),
            avg_unforced_errors_per_min: round4(avg_unforced_errors_per_min(&all_sessions)),
            improvement_slope_composure: round4(improvement_slope_composure(&all_sessions)),
            improvement_slope_rushing: round4(improvement_slope_rushing(&all_sessions)),
            last_calculated_at: now,
        };
        self.store.upsert_user_stats(user_id, user_stats).await?;

        self.recompute_opponents(&match_sessions, now).await?;

        let weekly = compute_weekly_stats(&all_sessions, now);
        let weeks = weekly.len();
        self.store.replace_weekly_stats(user_id, weekly).await?;

        debug!(
            %user_id,
            sessions = all_sessions.len(),
            weeks,
            "recomputed projections"
        );
        Ok(())
    }

    async fn recompute_opponents(
        &self,
        match_sessions: &[Session],
        now: DateTime<Utc>,
    ) -> Result<(), ProjectionError> {
        let mut by_opponent: HashMap<Uuid, Vec<Session>> = HashMap::new();
        let mut session_ids = Vec::new();
        for item in match_sessions {
            let Some(opponent_id) = item.opponent_id else {
                continue;
            };
            by_opponent.entry(opponent_id).or_default().push(item.clone());
            session_ids.push(item.id);
        }

        let sets_by_session = self
            .store
            .list_match_sets_by_session_ids(&session_ids)
            .await?;

        for (opponent_id, items) in by_opponent {
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

            let stats = OpponentStats {
                matches_played: items.len() as u32,
                win_rate: round4(win_rate(&items)),
                avg_composure: round4(average_composure(&items)),
                avg_rushing_index: round4(average_rushing_index(&items)),
                avg_set_differential: round4(total_diff as f64 / items.len() as f64),
                last_calculated_at: now,
            };
            self.store.upsert_opponent_stats(opponent_id, stats).await?;
        }

        Ok(())
    }
}

fn compute_weekly_stats(items: &[Session], now: DateTime<Utc>) -> Vec<WeeklyStats> {
    let mut by_week: BTreeMap<DateTime<Utc>, (Vec<Session>, Vec<Session>)> = BTreeMap::new();
    for item in items {
        let bucket = by_week.entry(week_start(item.date)).or_default();
        bucket.0.push(item.clone());
        if item.is_match() {
            bucket.1.push(item.clone());
        }
    }

    by_week
        .into_iter()
        .map(|(week, (sessions, matches))| WeeklyStats {
            week_start_date: week,
            avg_composure: round4(average_composure(&sessions)),
            avg_rushing_index: round4(average_rushing_index(&sessions)),
            win_rate: round4(win_rate(&matches)),
            matches_played: matches.len() as u32,
            last_calculated_at: now,
        })
        .collect()
}

/// Bus subscriber that recomputes the affected user's projections.
pub struct RecomputeOnEvent {
    service: Arc<ProjectionService>,
}

impl RecomputeOnEvent {
    pub fn new(service: Arc<ProjectionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for RecomputeOnEvent {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        self.service.recompute_for_user(event.user_id()).await?;
        Ok(())
    }
}
