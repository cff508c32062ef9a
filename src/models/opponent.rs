//! Opponent model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A known opponent, scoped to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opponent {
    pub id: Uuid,
    /// Stable dedup key across client installs. Defaults to the id when the
    /// client leaves it blank.
    #[serde(default)]
    pub identity_key: String,
    pub user_id: Uuid,
    pub name: String,
    pub dominant_hand: Option<String>,
    pub play_style: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Opponent {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Fill a blank identity key with the opponent id.
    pub fn ensure_identity_key(&mut self) {
        if self.identity_key.trim().is_empty() {
            self.identity_key = self.id.to_string();
        }
    }
}
