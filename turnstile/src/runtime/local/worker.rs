use crate::context;
use crate::runtime::local::Handle;
use crate::runtime::registry::Notified;
use crate::runtime::waker::RootWaker;
use crate::runtime::{EventLoop, PanicReason, Schedule, SchedulerError, SchedulerPanic};
use crate::task::{Id, TransitionToScheduled};
use crate::utils::ScopeGuard;
use crate::utils::scheduler::{Call, Method};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    Complete(Id),
    Pending,

    /// The continuation pointed at a task that was already released.
    Stale,
}

/// Run loop over a scheduler's ready queue. Holds no state of its own, every
/// drain, slice or `block_on` gets a fresh one.
#[derive(Debug)]
pub(crate) struct Worker<'a> {
    handle: &'a Handle,
}

impl<'a> Worker<'a> {
    pub(crate) fn new(handle: &'a Handle) -> Self {
        Self { handle }
    }

    /// Drains the queue to exhaustion.
    pub(crate) fn run(&self) -> usize {
        let _ctx = context::enter_scheduler(self.handle);
        tracing::debug!(queued = self.handle.0.queue.borrow().len(), "drain started");

        let mut completed = 0;
        loop {
            self.process_wakes();

            let Some(task) = self.find_task() else {
                break;
            };

            if let PollOutcome::Complete(_) = self.run_task(task) {
                completed += 1;
            }
        }

        self.warn_parked();
        tracing::debug!(completed, "drain finished");
        completed
    }

    /// Follows yield hand-offs from the head of the queue until one task
    /// completes.
    pub(crate) fn run_slice(&self) -> Option<Id> {
        let _ctx = context::enter_scheduler(self.handle);

        loop {
            self.process_wakes();

            if let PollOutcome::Complete(id) = self.run_task(self.find_task()?) {
                tracing::trace!(%id, "slice finished");
                return Some(id);
            }
        }
    }

    /// Moves pending wake requests onto the ready queue. Wakes that do not fit
    /// stay in the wake list until the queue has room again.
    fn process_wakes(&self) {
        let scheduler = &self.handle.0;

        while scheduler.queue.borrow().has_room() {
            let Some(target) = scheduler.wakes.pop() else {
                break;
            };

            let transition = scheduler.tasks.borrow_mut().notify(target);
            if transition == TransitionToScheduled::Submit
                && let Err(e) = self.handle.schedule(target)
            {
                std::panic::panic_any(SchedulerPanic::new(
                    PanicReason::InvalidState,
                    Some(target.id()),
                    format!("woken task lost: {e}"),
                ));
            }
        }
    }

    /// Polls one task. No borrow of the scheduler is held while the task body
    /// runs, so it is free to spawn, drain or drop handles.
    fn run_task(&self, target: Notified) -> PollOutcome {
        let scheduler = &self.handle.0;

        let Some(mut task) = scheduler.tasks.borrow_mut().checkout(target) else {
            tracing::trace!(id = %target.id(), "skipping stale continuation");
            return PollOutcome::Stale;
        };

        let id = task.id();
        let Some(waker) = task.waker().cloned() else {
            std::panic::panic_any(SchedulerPanic::new(
                PanicReason::InvalidState,
                Some(id),
                "registered task has no waker",
            ));
        };

        scheduler.track(Method::Poll, Call::Poll { id });

        let span = tracing::trace_span!("task", %id, name = task.name());
        let res = {
            let _enter = span.enter();
            tracing::trace!("poll");

            let mut cx = Context::from_waker(&waker);
            catch_unwind(AssertUnwindSafe(|| task.poll_step(&mut cx)))
        };

        match res {
            Ok(Poll::Ready(())) => {
                tracing::debug!(%id, polls = task.polls(), "task complete");
                scheduler.record_completion();
                self.handle.release(target);
                drop(task);

                PollOutcome::Complete(id)
            }
            Ok(Poll::Pending) => {
                if scheduler.tasks.borrow_mut().checkin(target, task) {
                    scheduler.wakes.push(target);
                }

                PollOutcome::Pending
            }
            Err(payload) => {
                // Credits the owner before the panic policy kicks in.
                task.complete();
                scheduler.record_completion();
                self.handle.release(target);
                drop(task);

                self.handle.unhandled_panic(id, payload);
                PollOutcome::Complete(id)
            }
        }
    }

    fn warn_parked(&self) {
        let parked = self.handle.0.tasks.borrow().parked();
        if parked > 0 {
            tracing::warn!(parked, "drain finished with parked tasks that were never woken");
        }
    }
}

impl EventLoop for Worker<'_> {
    type Task = Notified;

    fn add_task(&self, task: Self::Task) -> Result<(), SchedulerError> {
        tracing::trace!(id = %task.id(), "push");
        self.handle.0.queue.borrow_mut().push_back(task)
    }

    fn find_task(&self) -> Option<Self::Task> {
        let task = self.handle.0.queue.borrow_mut().try_pop_front();
        if let Some(task) = &task {
            tracing::trace!(id = %task.id(), "pop");
        }
        task
    }

    fn event_loop<F: Future>(&self, root_future: F) -> Result<F::Output, SchedulerError> {
        let _ctx = context::enter_scheduler(self.handle);

        let root_waker = RootWaker::new();
        let waker = Waker::from(root_waker.clone());
        let mut cx = Context::from_waker(&waker);

        let mut root_future = pin!(root_future);
        let mut output = None;

        loop {
            self.process_wakes();

            if output.is_none() && root_waker.take_woken() {
                // The root is not a task, even when block_on is called from
                // inside one.
                let prev = context::set_current_task(None);
                let _restore = ScopeGuard::new(move || {
                    context::set_current_task(prev);
                });

                if let Poll::Ready(v) = root_future.as_mut().poll(&mut cx) {
                    output = Some(v);
                }
            }

            if let Some(task) = self.find_task() {
                self.run_task(task);
                continue;
            }

            // Queue is empty, but a wake may still be in flight.
            if !self.handle.0.wakes.is_empty() || (output.is_none() && root_waker.is_woken()) {
                continue;
            }

            if let Some(output) = output {
                self.warn_parked();
                return Ok(output);
            }

            // Our own `root_waker` and `waker` are the only references: the
            // root kept no waker, nothing can ever poll it again.
            if Arc::strong_count(&root_waker) <= 2 {
                return Err(SchedulerError::RootStalled);
            }

            tracing::trace!("root pending with nothing runnable, parking thread");
            self.handle.0.wakes.park_until(|| root_waker.is_woken());
        }
    }
}
