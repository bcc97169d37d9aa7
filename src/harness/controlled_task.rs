//! # Controlled task
//!
//! One reader or writer which goes through the lock step by step, as the driver allows:
//!
//! ```text
//! NONE -> READY -> WAITING -> LOCKED -> UNLOCKED
//!      |        |          |         |
//!      |        |          |         +- the driver opened the "complete" gate, the work is done, unlocked
//!      |        |          +- the lock call returned
//!      |        +- the driver opened the "lock" gate, the lock call is issued
//!      +- all the tasks are at the starting line
//! ```
//!
//! There are 2 barriers on the way to READY, both shared with the driver:
//! - the starting line, everybody is there
//! - the ready line, everybody has stored READY, so the driver sees it without polling
//!
//! The status is written by the task's own thread only and read by the driver,
//! so it's a plain atomic: no need to lock anything to look at it.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{
            AtomicU8,
            Ordering::{Acquire, Release},
        },
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use strum_macros::{Display, EnumIter, FromRepr};
use tracing::info;

use crate::{
    error::HarnessError,
    fair_lock::{Access, ReadWriteLock},
    sync_points::{CountBarrier, OneShotGate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumIter, FromRepr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum LockStatus {
    None,
    Ready,
    Waiting,
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Role {
    Reader,
    Writer,
}

impl Role {
    pub fn access(self) -> Access {
        match self {
            Role::Reader => Access::Read,
            Role::Writer => Access::Write,
        }
    }

    fn prefix(self) -> char {
        match self {
            Role::Reader => 'R',
            Role::Writer => 'W',
        }
    }
}

/// The part of a task both the task's thread and the driver see
pub(crate) struct TaskShared {
    id: String,
    role: Role,
    status: AtomicU8,
    pub(crate) lock_gate: OneShotGate,
    pub(crate) complete_gate: OneShotGate,
}

impl TaskShared {
    pub(crate) fn new(role: Role, seq: usize) -> Self {
        Self {
            id: format!("{}{seq}", role.prefix()),
            role,
            status: AtomicU8::new(LockStatus::None as u8),
            lock_gate: OneShotGate::new(),
            complete_gate: OneShotGate::new(),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn status(&self) -> LockStatus {
        // only valid discriminants are ever stored
        LockStatus::from_repr(self.status.load(Acquire)).unwrap_or(LockStatus::None)
    }

    fn advance(&self, status: LockStatus, progress: &str) {
        self.status.store(status as u8, Release);
        self.log_progress(progress);
    }

    fn log_progress(&self, progress: &str) {
        info!(task = %self.id, status = %self.status(), "{progress}");
    }
}

/// A runnable handle, see [ControlledTask::run]. Created by [super::ExecutionGroup].
pub struct ControlledTask<T> {
    pub(crate) shared: Arc<TaskShared>,
    pub(crate) lock: Arc<dyn ReadWriteLock>,
    pub(crate) start_line: Arc<CountBarrier>,
    pub(crate) ready_line: Arc<CountBarrier>,
    pub(crate) start_delay: Duration,
    pub(crate) work: Box<dyn FnOnce() -> T + Send>,
}

impl<T> ControlledTask<T> {
    pub fn id(&self) -> &str {
        self.shared.id()
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn status(&self) -> LockStatus {
        self.shared.status()
    }

    /// Run the task on the current thread, it's meant to be its own thread.
    ///
    /// Blocks at the starting line, then at each of the driver's gates.
    /// If the work panics, the lock is still released and the panic goes on.
    pub fn run(self) -> Result<T, HarnessError> {
        let Self {
            shared,
            lock,
            start_line,
            ready_line,
            start_delay,
            work,
        } = self;

        shared.log_progress("thread is started");
        if !start_delay.is_zero() {
            thread::sleep(start_delay);
        }
        start_line.arrive_and_wait()?;
        shared.advance(LockStatus::Ready, "thread is ready to go");
        ready_line.arrive_and_wait()?;

        shared.lock_gate.wait();
        shared.advance(LockStatus::Waiting, "attempting to get the lock");
        match shared.role.access() {
            Access::Read => lock.lock_read(),
            Access::Write => lock.lock_write(),
        }
        shared.advance(LockStatus::Locked, "lock obtained");

        shared.complete_gate.wait();
        shared.log_progress("completing execution");
        let outcome: Result<T, Box<dyn Any + Send>> = panic::catch_unwind(AssertUnwindSafe(work));
        let released = lock.unlock();
        shared.advance(LockStatus::Unlocked, "lock released");

        released?;
        match outcome {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl<T: Send + 'static> ControlledTask<T> {
    /// Run the task on a new thread named after it.
    pub fn spawn(self) -> Result<TaskHandle<T>, HarnessError> {
        let id = self.id().to_string();
        let spawned = thread::Builder::new()
            .name(id.clone())
            .spawn(move || self.run());
        match spawned {
            Ok(thread) => Ok(TaskHandle { id, thread }),
            Err(e) => Err(HarnessError::Spawn {
                task: id,
                reason: e.to_string(),
            }),
        }
    }
}

/// A [ControlledTask] running on its own thread
pub struct TaskHandle<T> {
    id: String,
    thread: JoinHandle<Result<T, HarnessError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the task to end. A panic in its work is [HarnessError::TaskPanicked].
    pub fn join(self) -> Result<T, HarnessError> {
        let Self { id, thread } = self;
        thread
            .join()
            .map_err(|_| HarnessError::TaskPanicked { task: id })?
    }
}

impl<T> fmt::Debug for ControlledTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlledTask")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("status", &self.shared.status())
            .finish()
    }
}
