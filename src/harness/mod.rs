//! # Deterministic concurrency harness
//!
//! The problem with testing a lock's fairness: the order in which threads call it is up to the scheduler.
//! The harness takes that away. Each reader / writer is a [ControlledTask] which stops twice:
//! - before requesting the lock
//! - before releasing it
//!
//! and the [ExecutionGroup] decides when each of them moves on. The test then looks at the statuses.
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use fair_rwlock::{fair_lock::FairRwLock, harness::{ExecutionGroup, LockStatus}};
//!
//! let mut group: ExecutionGroup = ExecutionGroup::new(Arc::new(FairRwLock::new()), Duration::from_millis(100));
//! let writer = group.create_writer_task().unwrap();
//! let reader = group.create_reader_task().unwrap();
//! let writer = writer.spawn().unwrap();
//! let reader = reader.spawn().unwrap();
//!
//! group.await_ready_to_lock().unwrap();
//! group.lock_in_order().unwrap();
//! assert_eq!(group.statuses(), [LockStatus::Locked, LockStatus::Waiting]);
//! group.complete_execution(0).unwrap();
//! assert_eq!(group.statuses(), [LockStatus::Unlocked, LockStatus::Locked]);
//!
//! group.complete_all();
//! writer.join().unwrap();
//! reader.join().unwrap();
//! ```

mod config;
mod controlled_task;
mod execution_group;

pub use config::{GroupConfig, STAGGER_BASE_VAR, STAGGER_STEP_VAR, WAIT_VAR};
pub use controlled_task::{ControlledTask, LockStatus, Role, TaskHandle};
pub use execution_group::ExecutionGroup;

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use crate::{error::HarnessError, fair_lock::FairRwLock};

    use super::LockStatus::{Locked, Ready, Unlocked, Waiting};
    use super::Role::{Reader, Writer};
    use super::*;

    const STD_WAIT: Duration = Duration::from_millis(100);

    type Handles<T> = Vec<TaskHandle<T>>;

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn spawn<T: Send + 'static>(task: ControlledTask<T>) -> TaskHandle<T> {
        task.spawn().unwrap()
    }

    /// create a task per role, start them all and let them request the lock in order
    fn lock_in_order(roles: &[Role]) -> (ExecutionGroup, Handles<()>) {
        init_logging();
        let mut group = ExecutionGroup::new(Arc::new(FairRwLock::new()), STD_WAIT);
        let handles = roles
            .iter()
            .map(|role| spawn(group.create_task(*role).unwrap()))
            .collect();
        group.await_ready_to_lock().unwrap();
        group.lock_in_order().unwrap();
        (group, handles)
    }

    fn finish<T>(group: ExecutionGroup<T>, handles: Handles<T>) -> Vec<T>
    where
        T: Send + 'static,
    {
        group.complete_all();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    /// write lock blocks subsequent writes, queued writers are woken up one by one
    #[test]
    fn test_www() {
        let (group, handles) = lock_in_order(&[Writer, Writer, Writer]);
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Waiting]);

        group.complete_execution(1).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Unlocked, Locked]);
        finish(group, handles);
    }

    /// write lock blocks subsequent reads, the queued readers are all woken up together
    #[test]
    fn test_wrr() {
        let (group, handles) = lock_in_order(&[Writer, Reader, Reader]);
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Locked]);
        finish(group, handles);
    }

    /// a pending write gets the lock after the read that was pending before it
    #[test]
    fn test_wrw() {
        let (group, handles) = lock_in_order(&[Writer, Reader, Writer]);
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Waiting]);
        finish(group, handles);
    }

    /// a pending read is queued after the last pending write, it doesn't join an earlier batch
    #[test]
    fn test_wrwr() {
        let (group, handles) = lock_in_order(&[Writer, Reader, Writer, Reader]);
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        group.complete_execution(1).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Unlocked, Locked, Waiting]);
        finish(group, handles);
    }

    #[test]
    fn test_rw() {
        let (group, handles) = lock_in_order(&[Reader, Writer]);
        assert_eq!(group.statuses(), [Locked, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked]);
        finish(group, handles);
    }

    /// readers share the lock and unlock independently
    #[test]
    fn test_rrr() {
        let (group, handles) = lock_in_order(&[Reader, Reader, Reader]);
        assert_eq!(group.statuses(), [Locked, Locked, Locked]);

        group.complete_execution(0).unwrap();
        group.complete_execution(2).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Unlocked]);
        finish(group, handles);
    }

    /// the writer waits for *all* the readers
    #[test]
    fn test_rrw() {
        let (group, handles) = lock_in_order(&[Reader, Reader, Writer]);
        assert_eq!(group.statuses(), [Locked, Locked, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Waiting]);

        group.complete_execution(1).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Unlocked, Locked]);
        finish(group, handles);
    }

    /// a pending write blocks a read even though the lock is held for reading
    #[test]
    fn test_rwr() {
        let (group, handles) = lock_in_order(&[Reader, Writer, Reader]);
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Waiting]);

        group.complete_execution(1).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Unlocked, Locked]);
        finish(group, handles);
    }

    /// threads hit the starting line in reverse, the lock order is still the creation order
    #[test]
    fn test_staggered_start() {
        init_logging();
        let config = GroupConfig {
            stagger_base: Duration::from_millis(200),
            stagger_step: Duration::from_millis(50),
            ..GroupConfig::with_default_wait(STD_WAIT)
        };
        let mut group = ExecutionGroup::<()>::with_config(Arc::new(FairRwLock::new()), config);
        let handles = vec![
            spawn(group.create_writer_task().unwrap()),
            spawn(group.create_reader_task().unwrap()),
            spawn(group.create_writer_task().unwrap()),
        ];
        group.await_ready_to_lock().unwrap();
        group.lock_in_order().unwrap();
        assert_eq!(group.statuses(), [Locked, Waiting, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked, Waiting]);
        finish(group, handles);
    }

    #[test]
    fn test_results_of_the_work() {
        init_logging();
        let mut group = ExecutionGroup::new(Arc::new(FairRwLock::new()), STD_WAIT);
        let handles = vec![
            spawn(group.create_writer_task_with(|| "written").unwrap()),
            spawn(group.create_reader_task_with(|| "read").unwrap()),
        ];
        group.await_ready_to_lock().unwrap();
        group.lock_in_order().unwrap();
        assert_eq!(finish(group, handles), ["written", "read"]);
    }

    /// the lock is released even if the work panics
    #[test]
    fn test_panicking_work_releases_the_lock() {
        init_logging();
        let mut group = ExecutionGroup::<()>::new(Arc::new(FairRwLock::new()), STD_WAIT);
        let failing = spawn(group.create_writer_task_with(|| panic!("boom")).unwrap());
        let next = spawn(group.create_writer_task().unwrap());
        group.await_ready_to_lock().unwrap();
        group.lock_in_order().unwrap();
        assert_eq!(group.statuses(), [Locked, Waiting]);

        group.complete_execution(0).unwrap();
        assert_eq!(group.statuses(), [Unlocked, Locked]);
        assert_eq!(failing.id(), "W0");
        assert_eq!(
            failing.join(),
            Err(HarnessError::TaskPanicked {
                task: "W0".to_string()
            })
        );

        group.complete_execution(1).unwrap();
        assert_eq!(next.join(), Ok(()));
    }

    /// the driver is let go only once every task has stored READY, no waiting on top of it
    #[test]
    fn test_all_ready_right_after_the_start() {
        init_logging();
        let config = GroupConfig {
            stagger_base: Duration::from_millis(150),
            stagger_step: Duration::from_millis(50),
            ..GroupConfig::with_default_wait(STD_WAIT)
        };
        let mut group = ExecutionGroup::<()>::with_config(Arc::new(FairRwLock::new()), config);
        let handles = vec![
            spawn(group.create_reader_task().unwrap()),
            spawn(group.create_writer_task().unwrap()),
            spawn(group.create_reader_task().unwrap()),
        ];
        group.await_ready_to_lock().unwrap();
        assert_eq!(group.statuses(), [Ready, Ready, Ready]);
        finish(group, handles);
    }

    #[test]
    fn test_misuse() {
        let mut group = ExecutionGroup::<()>::new(Arc::new(FairRwLock::new()), STD_WAIT);
        assert_eq!(group.lock_in_order(), Err(HarnessError::NotReady));
        assert_eq!(group.lock_status(0), Err(HarnessError::NoSuchTask(0)));
        assert!(group.is_empty());

        // nobody else to wait for
        group.await_ready_to_lock().unwrap();
        assert_eq!(
            group.create_reader_task().unwrap_err(),
            HarnessError::GroupSealed
        );
        assert_eq!(
            group.create_writer_task().unwrap_err(),
            HarnessError::GroupSealed
        );
        assert_eq!(
            group.complete_execution(3),
            Err(HarnessError::NoSuchTask(3))
        );
        // the starting line can't be crossed twice
        assert_eq!(
            group.await_ready_to_lock(),
            Err(HarnessError::BarrierOverflow { parties: 1 })
        );
    }

    #[test]
    fn test_statuses_before_start() {
        let mut group = ExecutionGroup::<()>::new(Arc::new(FairRwLock::new()), STD_WAIT);
        let task = group.create_reader_task().unwrap();
        assert_eq!(task.id(), "R0");
        assert_eq!(task.role(), Reader);
        assert_eq!(group.lock_status(0), Ok(LockStatus::None));
        assert_eq!(group.len(), 1);
    }
}
