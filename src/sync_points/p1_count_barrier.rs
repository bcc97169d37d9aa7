//! # Count barrier
//!
//! Single use: the barrier trips when the last of its parties arrives and stays tripped.
//! Arriving at a tripped (or full) barrier is a wiring bug, it's reported as [HarnessError::BarrierOverflow].
//!
//! Parties can be enrolled with [CountBarrier::register] until the barrier trips.
//! It's how the harness grows the barrier while tasks are being created: some of them may already
//! be waiting at it, which is fine as the driver's own party keeps it from tripping.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::HarnessError;

#[derive(Debug, Default)]
struct Arrivals {
    parties: usize,
    arrived: usize,
    tripped: bool,
}

#[derive(Debug)]
pub struct CountBarrier {
    arrivals: Mutex<Arrivals>,
    all_arrived: Condvar,
}

impl CountBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            arrivals: Mutex::new(Arrivals {
                parties,
                ..Default::default()
            }),
            all_arrived: Condvar::new(),
        }
    }

    fn arrivals(&self) -> MutexGuard<'_, Arrivals> {
        self.arrivals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// add one more party, returns the new # of parties
    pub fn register(&self) -> Result<usize, HarnessError> {
        let mut a = self.arrivals();
        if a.tripped {
            return Err(HarnessError::BarrierOverflow { parties: a.parties });
        }
        a.parties += 1;
        Ok(a.parties)
    }

    /// Block until all the parties arrive. The last one to arrive releases everybody.
    pub fn arrive_and_wait(&self) -> Result<(), HarnessError> {
        let mut a = self.arrivals();
        if a.tripped || a.arrived >= a.parties {
            return Err(HarnessError::BarrierOverflow { parties: a.parties });
        }

        a.arrived += 1;
        trace!(arrived = a.arrived, parties = a.parties, "arrived at the barrier");
        if a.arrived == a.parties {
            a.tripped = true;
            drop(a);
            self.all_arrived.notify_all();
            return Ok(());
        }

        while !a.tripped {
            a = self
                .all_arrived
                .wait(a)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    pub fn parties(&self) -> usize {
        self.arrivals().parties
    }

    pub fn is_tripped(&self) -> bool {
        self.arrivals().tripped
    }
}
