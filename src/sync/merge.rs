//! Last-write-wins conflict resolution for pushed records.
//!
//! Every incoming entity is resolved against the stored copy by `updatedAt`
//! alone. The resolver never inspects entity contents, so sessions, match
//! sets, and opponents all share it.
//!
//! # Decision chain
//!
//! 1. No stored copy: **Insert**.
//! 2. Incoming `updatedAt` not strictly after the stored one: **Ignore**.
//!    Ties keep the stored copy, which makes retried pushes idempotent.
//! 3. Incoming carries a tombstone: **Update**, unless the stored tombstone
//!    is strictly later. A later delete is never resurrected by an earlier
//!    one; an equal tombstone accepts the retry.
//! 4. Otherwise: **Update**. A newer plain edit beats any stored state,
//!    including a tombstone, which is how a record is undeleted.

use std::fmt;

use chrono::{DateTime, Utc};

/// Outcome of resolving one incoming record against the stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    Insert,
    Update,
    Ignore,
}

impl fmt::Display for MergeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeDecision::Insert => "insert",
            MergeDecision::Update => "update",
            MergeDecision::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Resolve one incoming record against the stored copy.
///
/// `stored_updated_at` is `None` when no stored record exists.
pub fn resolve_by_updated_at(
    incoming_updated_at: DateTime<Utc>,
    stored_updated_at: Option<DateTime<Utc>>,
    incoming_deleted_at: Option<DateTime<Utc>>,
    stored_deleted_at: Option<DateTime<Utc>>,
) -> MergeDecision {
    let Some(stored_updated_at) = stored_updated_at else {
        return MergeDecision::Insert;
    };
    if incoming_updated_at <= stored_updated_at {
        return MergeDecision::Ignore;
    }

    if let Some(incoming_tombstone) = incoming_deleted_at {
        return match stored_deleted_at {
            Some(stored_tombstone) if incoming_tombstone < stored_tombstone => {
                MergeDecision::Ignore
            }
            _ => MergeDecision::Update,
        };
    }

    MergeDecision::Update
}
