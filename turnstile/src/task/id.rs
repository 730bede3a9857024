use crate::context::{self, TaskFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task relative to all other tasks
/// created by this process.
///
/// # Notes
///
/// - Ids are handed out when the [`Task`] is created, not when it is spawned,
///   so they do not reflect scheduling order.
/// - The id of the task being polled can be obtained from inside the task via
///   [`task::try_id()`](crate::task::try_id()) and
///   [`task::id()`](crate::task::id()).
///
/// [`Task`]: crate::task::Task
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(pub(crate) NonZeroU64);

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// This function panics if called from outside a task. The root future given
/// to `block_on` is not a task. For a version of this function that doesn't
/// panic, see [`task::try_id()`](crate::task::try_id()).
#[track_caller]
pub fn id() -> Id {
    context::current_task_id().expect("Can't get a task id when not inside a task")
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

/// Returns the [`Id`] of the task that `.await`ed the currently running task.
///
/// `None` outside of a task, and for tasks that were spawned or resumed by
/// hand rather than awaited from inside another task.
pub fn parent_id() -> Option<Id> {
    context::current_task().and_then(|frame| frame.parent)
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Even at a billion tasks per second this takes centuries to wrap.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

/// Sets the task id in the context while the task is polled, and restores the
/// previous one on drop. Awaited tasks nest inside their parent's guard.
pub(crate) struct TaskIdGuard {
    prev: Option<TaskFrame>,
}

impl TaskIdGuard {
    pub(crate) fn enter(id: Id, parent: Option<Id>) -> Self {
        TaskIdGuard {
            prev: context::set_current_task(Some(TaskFrame { id, parent })),
        }
    }
}

impl Drop for TaskIdGuard {
    fn drop(&mut self) {
        context::set_current_task(self.prev);
    }
}
