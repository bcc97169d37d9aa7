//! # FIFO-fair read-write lock
//!
//! Unlike the atomic-only RWLock (one state word, readers and writers race for it),
//! this one keeps an explicit queue of pending requests and serves them strictly in arrival order:
//! - a writer is granted only when nobody holds the lock and it's at the head of the queue
//! - a reader is granted when nobody writes and there's no pending writer ahead of it
//!
//! The bookkeeping lives in a single [Mutex], the waiting is done on a [Condvar].
//! It is the poor-man-s channel (VecDeque + Condvar) turned into a lock.
//!
//! ## Hand-off
//!
//! Waiters don't compete for the lock when woken up. The releasing thread grants the lock
//! to the next eligible request(s) itself, while still inside the critical section:
//! - either the single writer at the head of the queue
//! - or every reader at the head of the queue up to the first writer (the batch)
//!
//! then wakes everybody up, so the granted ones can see their tickets.
//! This way the whole batch of readers becomes "locked" at once and nothing can sneak in between.
//!
//! There's an invariant which follows from the above: the head of the queue is never grantable
//! once the critical section is left. So a new request only skips the queue when it's empty.
//!
//! ## Ownership
//!
//! Grants belong to threads. [FairRwLock::unlock] releases the grant of the calling thread,
//! if there's none, it's [LockError::NotOwner]. Re-entrant locking isn't supported.

use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use strum_macros::Display;
use tracing::{debug, trace, warn};

use crate::error::LockError;

/// The lock interface the harness drives.
///
/// `lock_*` block until granted and never fail, unlock fails only if the calling thread holds nothing.
pub trait ReadWriteLock: Send + Sync {
    fn lock_read(&self);
    fn lock_write(&self);
    fn unlock(&self) -> Result<(), LockError>;
}

/// Kind of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Access {
    Read,
    Write,
}

/// What the lock is currently granted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LockMode {
    Free,
    Read,
    Write,
}

/// A consistent copy of the lock's bookkeeping at some moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    pub mode: LockMode,
    /// number of read grants
    pub readers: usize,
    pub writer_held: bool,
    /// number of requests waiting in the queue
    pub queued: usize,
}

struct Request {
    ticket: u64,
    access: Access,
    owner: ThreadId,
}

#[derive(Default)]
struct LockState {
    readers: Vec<ThreadId>,
    writer: Option<ThreadId>,
    queue: VecDeque<Request>,
    next_ticket: u64,
    /// tickets granted by a releasing thread but not yet picked up by their waiters
    handed_off: Vec<u64>,
}

impl LockState {
    fn mode(&self) -> LockMode {
        match (self.writer, self.readers.is_empty()) {
            (Some(_), _) => LockMode::Write,
            (None, false) => LockMode::Read,
            (None, true) => LockMode::Free,
        }
    }

    /// could the access be granted on top of the current holders
    fn admits(&self, access: Access) -> bool {
        match access {
            Access::Read => self.writer.is_none(),
            Access::Write => self.writer.is_none() && self.readers.is_empty(),
        }
    }

    fn grant(&mut self, access: Access, owner: ThreadId) {
        match access {
            Access::Read => self.readers.push(owner),
            Access::Write => self.writer = Some(owner),
        }
    }

    fn enqueue(&mut self, access: Access, owner: ThreadId) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back(Request {
            ticket,
            access,
            owner,
        });
        ticket
    }

    /// grant the head of the queue for as long as it's compatible, returns # of grants
    fn grant_from_queue(&mut self) -> usize {
        let mut granted = 0;
        while let Some(head) = self.queue.front() {
            if !self.admits(head.access) {
                break;
            }
            // the front is there, we've just looked at it
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            self.grant(request.access, request.owner);
            self.handed_off.push(request.ticket);
            granted += 1;
        }
        granted
    }

    /// the waiter side of the hand-off
    fn take_grant(&mut self, ticket: u64) -> bool {
        match self.handed_off.iter().position(|t| *t == ticket) {
            Some(i) => {
                self.handed_off.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// drop one grant of the owner, returns what it was
    fn release(&mut self, owner: ThreadId) -> Option<Access> {
        if self.writer == Some(owner) {
            self.writer = None;
            return Some(Access::Write);
        }
        let i = self.readers.iter().position(|r| *r == owner)?;
        self.readers.swap_remove(i);
        Some(Access::Read)
    }
}

pub struct FairRwLock {
    state: Mutex<LockState>,
    granted: Condvar,
}

impl FairRwLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            granted: Condvar::new(),
        }
    }

    /// Nothing in the critical section can panic half-way through an update,
    /// so a poisoned state is still a consistent one.
    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, access: Access) {
        let me = thread::current().id();
        let mut state = self.state();

        // the head of a non-empty queue is never grantable => only an empty queue may be skipped
        if state.queue.is_empty() && state.admits(access) {
            state.grant(access, me);
            trace!(?me, %access, "granted right away");
            return;
        }

        let ticket = state.enqueue(access, me);
        trace!(?me, %access, ticket, queued = state.queue.len(), "queued");
        while !state.take_grant(ticket) {
            state = self
                .granted
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        trace!(?me, %access, ticket, "granted after waiting");
    }

    pub fn lock_read(&self) {
        self.acquire(Access::Read);
    }

    pub fn lock_write(&self) {
        self.acquire(Access::Write);
    }

    /// Release the grant held by the calling thread and hand the lock over to the queue's head.
    pub fn unlock(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state();

        let Some(released) = state.release(me) else {
            warn!(?me, "unlock without a grant");
            return Err(LockError::NotOwner);
        };

        // a reader leaving while others still read can't unblock the head (it's a writer)
        if state.mode() == LockMode::Free {
            let woken = state.grant_from_queue();
            if woken > 0 {
                debug!(?me, %released, woken, "handed the lock over");
                drop(state);
                self.granted.notify_all();
                return Ok(());
            }
        }
        trace!(?me, %released, "released");
        Ok(())
    }

    pub fn snapshot(&self) -> LockSnapshot {
        let state = self.state();
        LockSnapshot {
            mode: state.mode(),
            readers: state.readers.len(),
            writer_held: state.writer.is_some(),
            queued: state.queue.len(),
        }
    }
}

impl Default for FairRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FairRwLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FairRwLock")
            .field("state", &self.snapshot())
            .finish()
    }
}

impl ReadWriteLock for FairRwLock {
    fn lock_read(&self) {
        FairRwLock::lock_read(self)
    }

    fn lock_write(&self) {
        FairRwLock::lock_write(self)
    }

    fn unlock(&self) -> Result<(), LockError> {
        FairRwLock::unlock(self)
    }
}
