use crate::runtime::registry::Notified;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Wake, Waker};
use std::thread::{self, Thread};

/// Wake requests waiting to be moved onto a ready queue.
///
/// Wakers may be cloned into foreign futures and fired from any thread, so the
/// list is the only piece of scheduler state that is shared. The owning
/// scheduler drains it on its own thread.
#[derive(Debug, Default)]
pub(crate) struct WakeList {
    pending: Mutex<VecDeque<Notified>>,

    /// Thread parked in `park_until`, if any.
    sleeper: Mutex<Option<Thread>>,
}

impl WakeList {
    pub(crate) fn push(&self, notified: Notified) {
        self.pending.lock().push_back(notified);

        if let Some(thread) = self.sleeper.lock().as_ref() {
            thread.unpark();
        }
    }

    /// Parks the calling thread until a wake is pushed or `woken` returns
    /// true. Whoever makes `woken` true must unpark this thread.
    pub(crate) fn park_until(&self, woken: impl Fn() -> bool) {
        *self.sleeper.lock() = Some(thread::current());

        // The sleeper is registered before checking, a push racing with the
        // check leaves an unpark token and `park` returns right away.
        while self.is_empty() && !woken() {
            thread::park();
        }

        *self.sleeper.lock() = None;
    }

    pub(crate) fn pop(&self) -> Option<Notified> {
        self.pending.lock().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.pending.lock().clear();
    }
}

/// Waker handed to a task registered with a scheduler.
#[derive(Debug)]
pub(crate) struct TaskWaker {
    target: Notified,
    wakes: Arc<WakeList>,
}

impl TaskWaker {
    pub(crate) fn waker(target: Notified, wakes: Arc<WakeList>) -> Waker {
        Waker::from(Arc::new(TaskWaker { target, wakes }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wakes.push(self.target);
    }
}

/// Waker for the root future given to `block_on`. The root is not a task, it
/// lives on the caller's stack, so a wake flips a flag and unparks the thread
/// driving it.
#[derive(Debug)]
pub(crate) struct RootWaker {
    woken: AtomicBool,

    driver: Thread,
}

impl RootWaker {
    /// Starts woken so the root gets its first poll. Must be created on the
    /// thread that polls the root.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            woken: AtomicBool::new(true),
            driver: thread::current(),
        })
    }

    pub(crate) fn take_woken(&self) -> bool {
        self.woken.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_woken(&self) -> bool {
        self.woken.load(Ordering::Acquire)
    }
}

impl Wake for RootWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.driver.unpark();
    }
}
