//! # One-shot gate
//!
//! It's the condvar's counter trick with a single possible notification:
//! the atomic goes 0 -> 1 once and stays there.
//!
//! - waiters block on the value 0, so they can't miss the opening,
//!   it either happened before they looked or they get woken up
//! - spurious wake-ups are fine, the value is re-checked
//! - opening twice doesn't wake anybody, there's nobody left blocked on 0
//!
//! Release on open / Acquire on wait, so whatever was done before opening the gate
//! is visible to whoever passes it.

use std::sync::atomic::{
    AtomicU32,
    Ordering::{Acquire, Release},
};

use atomic_wait::{wait, wake_all};

const CLOSED: u32 = 0;
const OPEN: u32 = 1;

#[derive(Debug)]
pub struct OneShotGate {
    state: AtomicU32,
}

impl OneShotGate {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(CLOSED),
        }
    }

    /// let everybody through, now and later
    pub fn open(&self) {
        if self.state.swap(OPEN, Release) == CLOSED {
            wake_all(&self.state);
        }
    }

    /// block until the gate is opened, returns right away if it already is
    pub fn wait(&self) {
        while self.state.load(Acquire) == CLOSED {
            wait(&self.state, CLOSED);
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Acquire) == OPEN
    }
}

impl Default for OneShotGate {
    fn default() -> Self {
        Self::new()
    }
}
