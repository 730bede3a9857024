use crate::context;
use crate::runtime::local::worker::Worker;
use crate::runtime::registry::Notified;
use crate::runtime::waker::WakeList;
use crate::runtime::{
    EventLoop, OwnedTasks, ReadyQueue, RuntimeConfig, Schedule, SchedulerError, SchedulerPanic,
    UnhandledPanic,
};
use crate::task::{Id, State, Task};
use crate::utils::scheduler::{Call, Method};
#[cfg(test)]
use crate::utils::scheduler::Tracker;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Scheduler {
    pub(crate) cfg: RuntimeConfig,

    /// Continuations ready to run right now.
    pub(crate) queue: RefCell<ReadyQueue<Notified>>,

    /// Every task handed to this scheduler that has not completed yet.
    pub(crate) tasks: RefCell<OwnedTasks>,

    /// Shared with every task waker.
    pub(crate) wakes: Arc<WakeList>,

    spawned: Cell<u64>,

    completed: Cell<u64>,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Scheduler {
    pub(crate) fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            queue: RefCell::new(ReadyQueue::new(cfg.queue_capacity, cfg.queue_overflow)),
            tasks: RefCell::new(OwnedTasks::with_capacity(cfg.queue_capacity)),
            wakes: Arc::new(WakeList::default()),
            spawned: Cell::new(0),
            completed: Cell::new(0),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    pub(crate) fn into_handle(self) -> Handle {
        Handle(Rc::new(self))
    }

    pub(crate) fn record_completion(&self) {
        self.completed.set(self.completed.get() + 1);
    }

    // Small price to pay to get introspection on all scheduler calls during
    // testing. No op in release builds.
    #[allow(unused)]
    #[inline(always)]
    pub(crate) fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }
}

/// Snapshot of a scheduler's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Continuations waiting in the ready queue.
    pub queued: usize,

    /// Current capacity of the ready queue.
    pub capacity: usize,

    /// Largest number of continuations ever queued at once.
    pub high_water: usize,

    /// Tasks owned by the scheduler that have not completed.
    pub registered: usize,

    /// Registered tasks that are pending and have not been woken.
    pub parked: usize,

    pub spawned: u64,

    pub completed: u64,
}

/// Handle to a single-threaded scheduler.
///
/// Handles are cheap to clone and all clones point at the same ready queue.
/// They cannot leave the thread the scheduler was built on.
#[derive(Debug, Clone)]
pub struct Handle(pub(super) Rc<Scheduler>);

impl Schedule for Handle {
    fn schedule(&self, task: Notified) -> Result<(), SchedulerError> {
        self.0.track(Method::Schedule, Call::Schedule { id: task.id() });
        Worker::new(self).add_task(task)
    }

    fn release(&self, task: Notified) {
        self.0.track(Method::Release, Call::Release { id: task.id() });

        // Dropped outside of the borrow, the task may own other handles.
        let released = self.0.tasks.borrow_mut().release(task);
        drop(released);
    }

    fn unhandled_panic(&self, id: Id, payload: Box<dyn Any + Send>) {
        self.0.track(Method::UnhandledPanic, Call::UnhandledPanic { id });

        let panic = SchedulerPanic::from_task_payload(id, payload.as_ref());
        match self.0.cfg.unhandled_panic {
            UnhandledPanic::Abort => {
                tracing::error!(%id, %panic, "task panicked, aborting");
                std::process::abort();
            }
            UnhandledPanic::Propagate => {
                tracing::error!(%id, %panic, "task panicked, propagating");
                std::panic::resume_unwind(payload);
            }
        }
    }
}

impl Handle {
    /// Returns a handle to the scheduler currently driving work on this
    /// thread.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a drain or `block_on`.
    #[track_caller]
    pub fn current() -> Handle {
        match context::current_scheduler() {
            Some(handle) => handle,
            None => panic!("no turnstile scheduler is running on this thread"),
        }
    }

    /// Like [`Handle::current`], without panicking.
    pub fn try_current() -> Option<Handle> {
        context::current_scheduler()
    }

    /// Queues `task` at the tail of the ready queue, with no owner.
    ///
    /// The task does not run until the queue is drained. If the queue is full
    /// under [`OverflowPolicy::Reject`], the task is dropped and `QueueFull` is
    /// returned.
    ///
    /// [`OverflowPolicy::Reject`]: crate::runtime::OverflowPolicy::Reject
    pub fn spawn(&self, task: Task) -> Result<Id, SchedulerError> {
        self.spawn_inner(task)
    }

    pub(crate) fn spawn_inner(&self, mut task: Task) -> Result<Id, SchedulerError> {
        let id = task.id();
        if task.is_finished() {
            return Err(SchedulerError::AlreadyComplete { id });
        }

        {
            let queue = self.0.queue.borrow();
            if !queue.has_room() {
                return Err(SchedulerError::QueueFull {
                    capacity: queue.capacity(),
                });
            }
        }

        let owned = task.has_owner();
        self.0.track(Method::Spawn, Call::Spawn { id, owned });
        tracing::debug!(%id, name = task.name(), owned, "spawn");

        task.set_state(State::Scheduled);
        let notified = self.0.tasks.borrow_mut().insert(task, &self.0.wakes);

        if let Err(e) = self.schedule(notified) {
            let released = self.0.tasks.borrow_mut().release(notified);
            drop(released);
            return Err(e);
        }

        self.0.spawned.set(self.0.spawned.get() + 1);
        Ok(id)
    }

    /// Runs queued tasks until the queue is empty, including tasks queued
    /// while draining. Returns how many tasks completed.
    pub fn run(&self) -> usize {
        Worker::new(self).run()
    }

    /// Runs one slice: resumes the head of the queue and keeps following
    /// yields until some task completes. Returns the completed task, or `None`
    /// if the queue ran empty first.
    pub fn run_slice(&self) -> Option<Id> {
        Worker::new(self).run_slice()
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Worker::new(self).event_loop(future) {
            Ok(output) => output,
            Err(e) => panic!("Failed to drive future to completion: {:?}", e),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        let queue = self.0.queue.borrow();
        let tasks = self.0.tasks.borrow();

        SchedulerStats {
            queued: queue.len(),
            capacity: queue.capacity(),
            high_water: queue.high_water(),
            registered: tasks.len(),
            parked: tasks.parked(),
            spawned: self.0.spawned.get(),
            completed: self.0.completed.get(),
        }
    }

    /// Returns true if both handles point at the same scheduler.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn track(&self, method: Method, call: Call) {
        self.0.track(method, call);
    }

    /// Drops every registered task without running it. Task futures may own
    /// handles to this scheduler, dropping them here breaks the cycle.
    pub(crate) fn shutdown(&self) {
        loop {
            let tasks = self.0.tasks.borrow_mut().take_all();
            let queued = self.0.queue.borrow_mut().take_all();
            self.0.wakes.clear();

            if tasks.is_empty() {
                break;
            }

            tracing::debug!(
                tasks = tasks.len(),
                queued = queued.len(),
                "dropping unfinished tasks on shutdown"
            );

            // Dropping a task may run arbitrary destructors, including ones
            // that spawn again, hence the loop.
            drop(tasks);
        }
    }
}

// Test-only helpers
#[cfg(test)]
impl Handle {
    pub(crate) fn tracker(&self) -> &Tracker {
        &self.0.tracker
    }
}
