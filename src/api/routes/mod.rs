pub mod analysis;
pub mod opponents;
pub mod sessions;
pub mod stats;
pub mod sync;
pub mod traffic;
