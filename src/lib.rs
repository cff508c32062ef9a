//! # Baseline Tracker
//!
//! An offline-first practice tracker for racquet sports. Clients record
//! sessions locally and sync batches to this server, which merges them
//! last-write-wins and keeps per-user statistics materialized for reads.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (sessions, match sets, opponents, stats rows)
//! - **storage**: JSONL persistence behind the `Store` trait
//! - **sync**: Batch push/pull with timestamp-based merge
//! - **events**: In-process event bus wiring writes to projection rebuilds
//! - **projections**: Materialized user, opponent and weekly statistics
//! - **stats**: Stateless calculators, correlations and deep insight reports
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod config;
pub mod events;
pub mod models;
pub mod projections;
pub mod stats;
pub mod storage;
pub mod sync;

pub use models::*;
