//! # Errors
//!
//! Every error here is a broken contract on the caller's side, nothing is transient.

use thiserror::Error;

/// Misuse of the lock itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    /// unlock() from a thread that holds neither a read nor a write grant
    #[error("no lock is currently held by the calling thread in any mode")]
    NotOwner,
}

/// Misuse of the test harness or its synchronization points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// a task was created after the group was released to run
    #[error("cannot create more tasks after await_ready_to_lock is called")]
    GroupSealed,

    /// more arrivals than the barrier has parties
    #[error("barrier of {parties} parties received an extra arrival")]
    BarrierOverflow { parties: usize },

    #[error("await_ready_to_lock must be called first")]
    NotReady,

    #[error("no task with sequence number {0}")]
    NoSuchTask(usize),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// the task's thread died, its work has panicked
    #[error("task {task} panicked")]
    TaskPanicked { task: String },

    #[error("can't spawn a thread for task {task}: {reason}")]
    Spawn { task: String, reason: String },

    #[error("invalid value `{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
}
