use crate::context;
use crate::task::{Id, Task};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by `.await`ing a [`Task`].
///
/// The awaited task runs inside the awaiting task's poll: it never goes
/// through a ready queue. Yields inside it suspend the whole chain, which is
/// re-queued as one unit under the awaiting task's waker. When the awaited
/// body completes, the awaiting task resumes in the same poll.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct TaskAwaiter {
    task: Task,
}

impl TaskAwaiter {
    /// Id of the awaited task.
    pub fn id(&self) -> Id {
        self.task.id()
    }
}

impl IntoFuture for Task {
    type Output = ();
    type IntoFuture = TaskAwaiter;

    fn into_future(self) -> TaskAwaiter {
        TaskAwaiter { task: self }
    }
}

impl Future for TaskAwaiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = &mut self.get_mut().task;

        if task.is_finished() {
            return Poll::Ready(());
        }

        // Register the continuation before the child starts running.
        if task.parent().is_none()
            && let Some(parent) = context::current_task_id()
        {
            tracing::trace!(child = %task.id(), %parent, "chaining task to awaiting parent");
            task.set_parent(parent);
        }

        task.poll_step(cx)
    }
}

#[cfg(test)]
mod tests {
    use crate::task::{State, Task};
    use crate::test_utils::*;
    use crate::yield_now;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_await_chains_child_to_parent() {
        let journal = Journal::default();
        let seen = Rc::new(Cell::new((None, None)));

        let child = {
            let journal = journal.clone();
            let seen = seen.clone();
            Task::new(async move {
                seen.set((crate::task::try_id(), crate::task::parent_id()));
                journal.record("child");
            })
        };
        let child_id = child.id();

        let mut parent = {
            let journal = journal.clone();
            Task::new(async move {
                journal.record("before");
                assert_eq!(crate::task::parent_id(), None);
                child.await;
                journal.record("after");
            })
        };
        let parent_id = parent.id();

        // Child completes synchronously, parent resumes in the same step.
        assert!(parent.resume());
        assert_eq!(journal.entries(), ["before", "child", "after"]);
        assert_eq!(seen.get(), (Some(child_id), Some(parent_id)));
        assert_eq!(crate::task::parent_id(), None);
    }

    #[test]
    fn test_parent_link_survives_child_yield() {
        let seen = Rc::new(RefCell::new(Vec::new()));

        let child = {
            let seen = seen.clone();
            Task::new(async move {
                seen.borrow_mut().push(crate::task::parent_id());
                yield_now().await;
                seen.borrow_mut().push(crate::task::parent_id());
            })
        };

        let mut parent = Task::new(async move {
            child.await;
        });
        let parent_id = parent.id();

        assert!(!parent.resume());
        assert!(parent.resume());
        assert_eq!(*seen.borrow(), [Some(parent_id), Some(parent_id)]);
    }

    #[test]
    fn test_child_yield_suspends_whole_chain() {
        let journal = Journal::default();
        let child = stepper("c", 2, &journal);

        let mut parent = {
            let journal = journal.clone();
            Task::new(async move {
                child.await;
                journal.record("after");
                yield_now().await;
                journal.record("end");
            })
        };

        assert!(!parent.resume());
        assert_eq!(journal.entries(), ["c0"]);
        assert_eq!(parent.state(), State::Idle);

        assert!(!parent.resume());
        assert_eq!(journal.entries(), ["c0", "c1"]);

        // Child completion transfers straight back to the parent.
        assert!(!parent.resume());
        assert_eq!(journal.entries(), ["c0", "c1", "after"]);

        assert!(parent.resume());
        assert_eq!(journal.entries(), ["c0", "c1", "after", "end"]);
    }

    #[test]
    fn test_await_finished_task_is_ready() {
        let journal = Journal::default();
        let mut child = stepper("c", 0, &journal);
        assert!(child.resume());

        let mut parent = {
            let journal = journal.clone();
            Task::new(async move {
                child.await;
                journal.record("after");
            })
        };

        assert!(parent.resume());
        assert_eq!(journal.entries(), ["after"]);
    }
}
