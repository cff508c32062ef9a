//! Push/pull synchronization between offline clients and the server store.
//!
//! A push applies client rows in three passes, parents before the rows
//! that reference them:
//!
//! 1. Opponents
//! 2. Sessions
//! 3. Match sets
//!
//! Each row is resolved against the stored timestamps (see [`merge`]) and
//! either inserted, updated, or ignored, so retried pushes converge on the
//! same state. After the passes a sync event is published and projections
//! recompute; a recompute failure is reported to the caller even though
//! the rows are already durable.

pub mod merge;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::events::{Bus, Event};
use crate::models::{MatchSet, Opponent, Session};
use crate::storage::{EntityKind, StorageError, Store};

pub use merge::{resolve_by_updated_at, MergeDecision};

/// Errors that can occur while syncing.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The pushed rows are durable but recomputing projections failed.
    #[error("changes saved but projections are stale: {0}")]
    StaleProjections(#[source] anyhow::Error),
}

/// Batch of client-side changes, grouped by entity kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub match_sets: Vec<MatchSet>,
    #[serde(default)]
    pub opponents: Vec<Opponent>,
}

/// How a push pass handled its rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub inserted: u32,
    pub updated: u32,
    pub ignored: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub sessions: EntityCounts,
    pub match_sets: EntityCounts,
    pub opponents: EntityCounts,
    pub server_timestamp: DateTime<Utc>,
}

/// Rows changed since the client's watermark. Clients advance their
/// watermark from the newest `updatedAt` they receive, so there is no
/// server timestamp here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub sessions: Vec<Session>,
    pub match_sets: Vec<MatchSet>,
    pub opponents: Vec<Opponent>,
}

/// Applies pushed batches and serves incremental pulls.
pub struct SyncService {
    store: Arc<dyn Store>,
    bus: Arc<Bus>,
}

impl SyncService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<Bus>) -> Self {
        Self { store, bus }
    }

    /// Apply a pushed batch for `user_id` and report per-kind counts.
    ///
    /// Sessions and opponents are stamped with the authenticated user
    /// before resolution; whatever user id the client sent is discarded.
    /// Match sets carry no user and are trusted to reference pushed or
    /// existing sessions.
    pub async fn push(
        &self,
        user_id: Uuid,
        request: PushRequest,
    ) -> Result<PushResponse, SyncError> {
        let mut opponents = EntityCounts::default();
        for mut item in request.opponents {
            item.user_id = user_id;
            let decision = self.apply_opponent(item).await?;
            tally(&mut opponents, decision);
        }

        let mut sessions = EntityCounts::default();
        for mut item in request.sessions {
            item.user_id = user_id;
            let decision = self.apply_session(item).await?;
            tally(&mut sessions, decision);
        }

        let mut match_sets = EntityCounts::default();
        for item in request.match_sets {
            let decision = self.apply_match_set(item).await?;
            tally(&mut match_sets, decision);
        }

        let response = PushResponse {
            sessions,
            match_sets,
            opponents,
            server_timestamp: Utc::now(),
        };

        self.bus
            .publish(&Event::SyncPushed { user_id })
            .await
            .map_err(SyncError::StaleProjections)?;

        debug!(
            %user_id,
            sessions = ?response.sessions,
            match_sets = ?response.match_sets,
            opponents = ?response.opponents,
            "applied push"
        );
        Ok(response)
    }

    /// Everything changed for `user_id` strictly after `updated_after`.
    pub async fn pull(
        &self,
        user_id: Uuid,
        updated_after: DateTime<Utc>,
    ) -> Result<PullResponse, SyncError> {
        let changes = self.store.pull_changes(user_id, updated_after).await?;
        Ok(PullResponse {
            sessions: changes.sessions,
            match_sets: changes.match_sets,
            opponents: changes.opponents,
        })
    }

    async fn apply_session(&self, item: Session) -> Result<MergeDecision, SyncError> {
        let stored = self
            .store
            .get_stored_timestamps(EntityKind::Session, item.id)
            .await?;
        let decision = resolve_by_updated_at(
            item.updated_at,
            stored.map(|t| t.updated_at),
            item.deleted_at,
            stored.and_then(|t| t.deleted_at),
        );
        match decision {
            MergeDecision::Insert => self.store.create_session(item).await?,
            MergeDecision::Update => self.store.update_session(item).await?,
            MergeDecision::Ignore => {}
        }
        Ok(decision)
    }

    async fn apply_opponent(&self, item: Opponent) -> Result<MergeDecision, SyncError> {
        let stored = self
            .store
            .get_stored_timestamps(EntityKind::Opponent, item.id)
            .await?;
        let decision = resolve_by_updated_at(
            item.updated_at,
            stored.map(|t| t.updated_at),
            item.deleted_at,
            stored.and_then(|t| t.deleted_at),
        );
        match decision {
            MergeDecision::Insert => self.store.create_opponent(item).await?,
            MergeDecision::Update => self.store.update_opponent(item).await?,
            MergeDecision::Ignore => {}
        }
        Ok(decision)
    }

    async fn apply_match_set(&self, item: MatchSet) -> Result<MergeDecision, SyncError> {
        let stored = self
            .store
            .get_stored_timestamps(EntityKind::MatchSet, item.id)
            .await?;
        let decision = resolve_by_updated_at(
            item.updated_at,
            stored.map(|t| t.updated_at),
            item.deleted_at,
            stored.and_then(|t| t.deleted_at),
        );
        match decision {
            MergeDecision::Insert => self.store.create_match_set(item).await?,
            MergeDecision::Update => self.store.update_match_set(item).await?,
            MergeDecision::Ignore => {}
        }
        Ok(decision)
    }
}

fn tally(counts: &mut EntityCounts, decision: MergeDecision) {
    match decision {
        MergeDecision::Insert => counts.inserted += 1,
        MergeDecision::Update => counts.updated += 1,
        MergeDecision::Ignore => counts.ignored += 1,
    }
}
