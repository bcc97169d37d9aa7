use std::{marker::PhantomData, sync::Arc, thread, time::Duration};

use tracing::{debug, info};

use super::{
    config::GroupConfig,
    controlled_task::{ControlledTask, LockStatus, Role, TaskShared},
};
use crate::{error::HarnessError, fair_lock::ReadWriteLock, sync_points::CountBarrier};

/// A set of [ControlledTask]s around one lock, driven from a single thread.
///
/// It's **not** meant to be shared: all the calls come from the test's own thread.
/// The tasks are handed out to be run elsewhere, on threads the caller owns.
///
/// The group is append-only until [ExecutionGroup::await_ready_to_lock], then it's sealed.
pub struct ExecutionGroup<T = ()> {
    lock: Arc<dyn ReadWriteLock>,
    config: GroupConfig,
    /// the driver is a party too, so the tasks can't start before it says so
    start_line: Arc<CountBarrier>,
    /// passed once every task has stored READY
    ready_line: Arc<CountBarrier>,
    tasks: Vec<Arc<TaskShared>>,
    sealed: bool,
    _result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> ExecutionGroup<T> {
    pub fn new(lock: Arc<dyn ReadWriteLock>, default_wait: Duration) -> Self {
        Self::with_config(lock, GroupConfig::with_default_wait(default_wait))
    }

    pub fn with_config(lock: Arc<dyn ReadWriteLock>, config: GroupConfig) -> Self {
        Self {
            lock,
            config,
            start_line: Arc::new(CountBarrier::new(1)),
            ready_line: Arc::new(CountBarrier::new(1)),
            tasks: Vec::new(),
            sealed: false,
            _result: PhantomData,
        }
    }

    pub fn create_task_with(
        &mut self,
        role: Role,
        work: impl FnOnce() -> T + Send + 'static,
    ) -> Result<ControlledTask<T>, HarnessError> {
        if self.sealed {
            return Err(HarnessError::GroupSealed);
        }
        self.start_line.register()?;
        self.ready_line.register()?;

        let seq = self.tasks.len();
        let shared = Arc::new(TaskShared::new(role, seq));
        self.tasks.push(Arc::clone(&shared));
        debug!(task = shared.id(), "created");

        Ok(ControlledTask {
            shared,
            lock: Arc::clone(&self.lock),
            start_line: Arc::clone(&self.start_line),
            ready_line: Arc::clone(&self.ready_line),
            start_delay: self.config.start_delay(seq),
            work: Box::new(work),
        })
    }

    pub fn create_reader_task_with(
        &mut self,
        work: impl FnOnce() -> T + Send + 'static,
    ) -> Result<ControlledTask<T>, HarnessError> {
        self.create_task_with(Role::Reader, work)
    }

    pub fn create_writer_task_with(
        &mut self,
        work: impl FnOnce() -> T + Send + 'static,
    ) -> Result<ControlledTask<T>, HarnessError> {
        self.create_task_with(Role::Writer, work)
    }

    /// Block until every task has passed the starting line and stored READY. Seals the group.
    ///
    /// Every created task must be running somewhere by now, otherwise it blocks forever.
    pub fn await_ready_to_lock(&mut self) -> Result<(), HarnessError> {
        self.sealed = true;
        info!(tasks = self.tasks.len(), "waiting for the tasks to start");
        self.start_line.arrive_and_wait()?;
        self.ready_line.arrive_and_wait()?;
        info!("all the tasks are ready to lock");
        Ok(())
    }

    pub fn lock_in_order(&self) -> Result<(), HarnessError> {
        self.lock_in_order_with(self.config.default_wait)
    }

    /// Let the tasks request the lock one by one, in their creation order.
    ///
    /// The next task gets its permission only once the previous one is seen past READY,
    /// i.e. it's either waiting for the lock or has it. The polling is a test aid
    /// to turn thread scheduling into a known order, it's not the lock's business.
    ///
    /// A task stores WAITING right before it calls into the lock, not once it's queued there.
    /// It's the `sleep_wait` after the gate opens which covers that gap, so keep it well above zero.
    pub fn lock_in_order_with(&self, sleep_wait: Duration) -> Result<(), HarnessError> {
        if !self.sealed {
            return Err(HarnessError::NotReady);
        }
        for task in &self.tasks {
            task.lock_gate.open();
            loop {
                thread::sleep(sleep_wait);
                if task.status() != LockStatus::Ready {
                    break;
                }
            }
            debug!(task = task.id(), status = %task.status(), "lock requested");
        }
        Ok(())
    }

    fn task(&self, seq: usize) -> Result<&TaskShared, HarnessError> {
        self.tasks
            .get(seq)
            .map(|t| t.as_ref())
            .ok_or(HarnessError::NoSuchTask(seq))
    }

    pub fn lock_status(&self, seq: usize) -> Result<LockStatus, HarnessError> {
        self.task(seq).map(TaskShared::status)
    }

    /// statuses of all the tasks in their creation order
    pub fn statuses(&self) -> Vec<LockStatus> {
        self.tasks.iter().map(|t| t.status()).collect()
    }

    pub fn complete_execution(&self, seq: usize) -> Result<(), HarnessError> {
        self.complete_execution_with(seq, self.config.default_wait)
    }

    /// Let the task `seq` do its work and unlock, then give it some time to actually do so.
    pub fn complete_execution_with(
        &self,
        seq: usize,
        sleep_wait: Duration,
    ) -> Result<(), HarnessError> {
        let task = self.task(seq)?;
        task.complete_gate.open();
        debug!(task = task.id(), "permitted to complete");
        thread::sleep(sleep_wait);
        Ok(())
    }

    /// Open every gate there is, so all the tasks run to the end in whatever order.
    pub fn complete_all(&self) {
        for task in &self.tasks {
            task.lock_gate.open();
            task.complete_gate.open();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T: Default + Send + 'static> ExecutionGroup<T> {
    /// a task with nothing to do but to lock and unlock
    pub fn create_task(&mut self, role: Role) -> Result<ControlledTask<T>, HarnessError> {
        self.create_task_with(role, T::default)
    }

    pub fn create_reader_task(&mut self) -> Result<ControlledTask<T>, HarnessError> {
        self.create_task(Role::Reader)
    }

    pub fn create_writer_task(&mut self) -> Result<ControlledTask<T>, HarnessError> {
        self.create_task(Role::Writer)
    }
}
