use crate::runtime::{Handle, SchedulerError, TaskOwner};
use crate::task::{Id, Task};
use crate::utils::scheduler::{Call, Method};
use std::cell::Cell;
use std::rc::Rc;

/// Admission control in front of a scheduler's ready queue.
///
/// A throttler admits at most `limit` tasks that have not completed yet. Each
/// [`Throttler::spawn`] takes one unit of budget, each admitted task gives it
/// back when its body completes. When the budget is exhausted, `spawn` runs
/// queued work in place until some admitted task completes, then admits the
/// new one.
///
/// Several throttlers may share a scheduler. Their budgets are independent but
/// the queue is not: forced progress and the drain on drop run whatever sits
/// at the head of the queue, whoever admitted it.
///
/// # Example
///
/// ```
/// use turnstile::runtime::{Builder, Throttler};
/// use turnstile::{Task, yield_now};
///
/// let runtime = Builder::new_local().try_build()?;
/// let throttler = Throttler::new(runtime.handle(), 2);
///
/// for _ in 0..8 {
///     throttler.spawn(Task::new(async {
///         yield_now().await;
///     }))?;
///     assert!(throttler.in_flight() <= 2);
/// }
///
/// // Dropping the throttler drains the queue.
/// drop(throttler);
/// assert_eq!(runtime.handle().stats().registered, 0);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Throttler {
    scheduler: Handle,
    budget: Rc<Budget>,
}

/// Snapshot of a throttler's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlerStats {
    pub limit: usize,
    pub remaining: usize,

    /// Admitted tasks that have not completed yet.
    pub in_flight: usize,

    pub admitted: u64,
    pub completed: u64,

    /// Slices run by `spawn` to win back budget.
    pub forced_slices: u64,
}

// Shared with every admitted task, which credits it on completion.
#[derive(Debug)]
struct Budget {
    limit: usize,
    remaining: Cell<usize>,
    admitted: Cell<u64>,
    completed: Cell<u64>,
    forced_slices: Cell<u64>,
}

impl Budget {
    fn debit(&self) {
        let remaining = self.remaining.get();
        debug_assert!(remaining > 0, "debit with no budget left");

        self.remaining.set(remaining.saturating_sub(1));
        self.admitted.set(self.admitted.get() + 1);
    }

    fn credit(&self) {
        let remaining = self.remaining.get();
        if remaining >= self.limit {
            tracing::warn!(limit = self.limit, "budget credit would exceed the limit, ignoring");
            return;
        }

        self.remaining.set(remaining + 1);
        self.completed.set(self.completed.get() + 1);
    }
}

impl TaskOwner for Budget {
    fn on_task_done(&self, id: Id) {
        self.credit();
        tracing::debug!(%id, remaining = self.remaining.get(), "budget credited");
    }
}

impl Throttler {
    /// Creates a throttler in front of `scheduler` with `limit` units of
    /// budget.
    #[track_caller]
    pub fn new(scheduler: &Handle, limit: usize) -> Throttler {
        assert!(limit > 0, "throttler limit must be greater than 0");

        Throttler {
            scheduler: scheduler.clone(),
            budget: Rc::new(Budget {
                limit,
                remaining: Cell::new(limit),
                admitted: Cell::new(0),
                completed: Cell::new(0),
                forced_slices: Cell::new(0),
            }),
        }
    }

    /// Admits `task` and queues it.
    ///
    /// With no budget left, queued work is run in place, one slice at a time,
    /// until an admitted task completes. If the queue empties first, nothing
    /// can give budget back and `BudgetExhausted` is returned; the task is
    /// dropped without running.
    pub fn spawn(&self, mut task: Task) -> Result<Id, SchedulerError> {
        if task.is_finished() {
            return Err(SchedulerError::AlreadyComplete { id: task.id() });
        }

        let limit = self.budget.limit;
        while self.budget.remaining.get() == 0 {
            self.scheduler.track(
                Method::ForcedDrain,
                Call::ForcedDrain {
                    limit,
                    remaining: 0,
                },
            );
            tracing::debug!(limit, "budget exhausted, forcing progress");
            self.budget.forced_slices.set(self.budget.forced_slices.get() + 1);

            if self.scheduler.run_slice().is_none() && self.budget.remaining.get() == 0 {
                return Err(SchedulerError::BudgetExhausted { limit });
            }
        }

        task.set_owner(self.budget.clone());
        let id = self.scheduler.spawn_inner(task)?;
        self.budget.debit();

        tracing::debug!(%id, remaining = self.budget.remaining.get(), "admitted");
        Ok(id)
    }

    /// Gives one unit of budget back. Admitted tasks do this on their own when
    /// they complete, calling it by hand lets budget be released early.
    /// Never raises the budget above the limit.
    pub fn on_task_done(&self) {
        self.budget.credit();
    }

    /// Drains the scheduler's queue. Returns how many tasks completed.
    pub fn run(&self) -> usize {
        self.scheduler.run()
    }

    pub fn limit(&self) -> usize {
        self.budget.limit
    }

    pub fn remaining(&self) -> usize {
        self.budget.remaining.get()
    }

    pub fn in_flight(&self) -> usize {
        self.budget.limit - self.budget.remaining.get()
    }

    pub fn stats(&self) -> ThrottlerStats {
        ThrottlerStats {
            limit: self.budget.limit,
            remaining: self.remaining(),
            in_flight: self.in_flight(),
            admitted: self.budget.admitted.get(),
            completed: self.budget.completed.get(),
            forced_slices: self.budget.forced_slices.get(),
        }
    }
}

impl Drop for Throttler {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!(
                in_flight = self.in_flight(),
                "dropping throttler while panicking, queue not drained"
            );
            return;
        }

        let completed = self.scheduler.run();
        tracing::debug!(completed, "throttler drained on drop");
    }
}
