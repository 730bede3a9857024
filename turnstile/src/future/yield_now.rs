use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Cooperatively gives up the current turn.
///
/// The calling task is re-queued at the tail of its scheduler's ready queue
/// and the scheduler moves on to the task at the head. A task driven by hand
/// with [`Task::resume`] simply returns control to its caller.
///
/// [`Task::resume`]: crate::task::Task::resume
///
/// # Example
///
/// ```
/// use turnstile::{Task, yield_now};
///
/// let mut task = Task::new(async {
///     yield_now().await;
/// });
///
/// assert!(!task.resume());
/// assert!(task.resume());
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow::new()
}

#[derive(Debug, Clone, Copy)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    awaiting_first_poll: bool,
}

impl YieldNow {
    pub fn new() -> Self {
        Self {
            awaiting_first_poll: true,
        }
    }
}

impl Default for YieldNow {
    fn default() -> Self {
        Self::new()
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Only yield on first poll. Next time task is scheduled we will return.
        if self.awaiting_first_poll {
            self.awaiting_first_poll = false;

            tracing::trace!(task = ?crate::task::try_id(), "yield_now");
            cx.waker().wake_by_ref();

            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}
