//! Core data models for the baseline tracker.

mod opponent;
mod session;
mod stats;

pub use opponent::*;
pub use session::*;
pub use stats::*;
