//! # Synchronization points
//!
//! The harness needs two kinds of them, both are unrelated to the lock under test:
//! - [CountBarrier] - the starting line, everybody waits until all the parties arrive
//! - [OneShotGate] - a single "go" signal for one specific waiter
//!
//! The barrier is the Mutex + Condvar kind, as it has to count.
//! The gate only has to flip a flag once, so it's a bare futex-style atomic.

pub mod p1_count_barrier;
pub mod p2_one_shot_gate;

pub use p1_count_barrier::CountBarrier;
pub use p2_one_shot_gate::OneShotGate;
