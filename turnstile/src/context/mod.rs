//! Thread-local bookkeeping shared by every scheduler living on this thread.
//!
//! Schedulers are owned through explicit [`Handle`]s and any number of them
//! may coexist. The context only remembers which scheduler is driving work
//! right now and which task it is polling, so code running inside a task can
//! find its way back without threading a handle through every call.
//!
//! [`Handle`]: crate::runtime::Handle
use crate::runtime::Handle;
use crate::task::Id;
use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};
use std::thread_local;

/// The task being polled on this thread, and the task that awaited it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaskFrame {
    pub(crate) id: Id,
    pub(crate) parent: Option<Id>,
}

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskFrame>> = const { Cell::new(None) };

    // Stack because a task may drive a second scheduler from its body.
    static SCHEDULERS: RefCell<Vec<Handle>> = const { RefCell::new(Vec::new()) };
}

/// Returns the id of the task currently being polled on this thread.
pub(crate) fn current_task_id() -> Option<Id> {
    current_task().map(|frame| frame.id)
}

pub(crate) fn current_task() -> Option<TaskFrame> {
    CURRENT_TASK.with(|current| current.get())
}

/// Sets the current task frame and returns the previous one so callers can
/// restore it once the poll returns.
pub(crate) fn set_current_task(frame: Option<TaskFrame>) -> Option<TaskFrame> {
    CURRENT_TASK.with(|current| current.replace(frame))
}

/// Marks `handle` as the scheduler driving work on this thread until the
/// returned guard is dropped.
pub(crate) fn enter_scheduler(handle: &Handle) -> ScopeGuard<'static, impl FnOnce()> {
    SCHEDULERS.with(|stack| stack.borrow_mut().push(handle.clone()));

    ScopeGuard::new(|| {
        SCHEDULERS.with(|stack| {
            stack.borrow_mut().pop();
        });
    })
}

/// Innermost scheduler currently driving work on this thread.
pub(crate) fn current_scheduler() -> Option<Handle> {
    SCHEDULERS.with(|stack| stack.borrow().last().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;
    use anyhow::Result;

    #[test]
    fn test_current_task_nests() {
        let outer = TaskFrame {
            id: Id::next(),
            parent: None,
        };
        let inner = TaskFrame {
            id: Id::next(),
            parent: Some(outer.id),
        };

        assert_eq!(current_task_id(), None);

        let prev = set_current_task(Some(outer));
        assert_eq!(prev, None);

        let prev_inner = set_current_task(Some(inner));
        assert_eq!(prev_inner, Some(outer));
        assert_eq!(current_task_id(), Some(inner.id));
        assert_eq!(current_task().and_then(|f| f.parent), Some(outer.id));

        set_current_task(prev_inner);
        assert_eq!(current_task_id(), Some(outer.id));

        set_current_task(prev);
        assert_eq!(current_task(), None);
    }

    #[test]
    fn test_enter_scheduler_is_scoped() -> Result<()> {
        let first = Builder::new_local().try_build()?;
        let second = Builder::new_local().try_build()?;

        assert!(current_scheduler().is_none());
        {
            let _outer = enter_scheduler(first.handle());
            assert!(current_scheduler().is_some_and(|h| h.ptr_eq(first.handle())));
            {
                let _inner = enter_scheduler(second.handle());
                assert!(current_scheduler().is_some_and(|h| h.ptr_eq(second.handle())));
            }
            assert!(current_scheduler().is_some_and(|h| h.ptr_eq(first.handle())));
        }
        assert!(current_scheduler().is_none());

        Ok(())
    }
}
