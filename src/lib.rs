pub mod error;
pub mod fair_lock;
pub mod harness;
pub mod sync_points;
