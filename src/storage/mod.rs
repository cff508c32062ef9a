//! Filesystem persistence.
//!
//! All state lives under one data directory:
//! - `store/` holds the JSONL table files, the source of truth for synced entities
//! - `derived/` holds materialized projection rows, safe to delete and recompute

use std::path::PathBuf;
use thiserror::Error;

pub mod jsonl;
pub mod store;

pub use jsonl::{EntityKind, JsonlReader, JsonlWriter};
pub use store::{JsonlStore, PulledChanges, Store, StoredTimestamps};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    pub fn derived_dir(&self) -> PathBuf {
        self.data_dir.join("derived")
    }

    pub fn table_path(&self, kind: EntityKind) -> PathBuf {
        self.store_dir().join(kind.filename())
    }

    pub fn user_stats_path(&self) -> PathBuf {
        self.derived_dir().join("user_stats.jsonl")
    }

    pub fn opponent_stats_path(&self) -> PathBuf {
        self.derived_dir().join("opponent_stats.jsonl")
    }

    pub fn weekly_stats_path(&self) -> PathBuf {
        self.derived_dir().join("weekly_stats.jsonl")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_paths() {
        let config = StorageConfig::new(PathBuf::from("/data"));

        assert_eq!(config.store_dir(), PathBuf::from("/data/store"));
        assert_eq!(config.derived_dir(), PathBuf::from("/data/derived"));
        assert_eq!(
            config.table_path(EntityKind::Session),
            PathBuf::from("/data/store/sessions.jsonl")
        );
        assert_eq!(
            config.table_path(EntityKind::MatchSet),
            PathBuf::from("/data/store/match_sets.jsonl")
        );
        assert_eq!(
            config.weekly_stats_path(),
            PathBuf::from("/data/derived/weekly_stats.jsonl")
        );
    }

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }
}
