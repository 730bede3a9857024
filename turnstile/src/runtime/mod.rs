use crate::runtime::registry::Notified;
use crate::task::Id;
use std::any::Any;
use std::fmt;

// Public API
#[allow(clippy::module_inception)]
pub mod runtime;
pub use runtime::{Builder, Runtime, UnhandledPanic};

pub mod errors;
pub use errors::{PanicReason, SchedulerError, SchedulerPanic};

pub mod queue;
pub use queue::{OverflowPolicy, ReadyQueue};

pub mod throttle;
pub use throttle::{Throttler, ThrottlerStats};

pub(crate) mod local;
pub use local::{Handle, SchedulerStats};

// Exports
pub(crate) use runtime::RuntimeConfig;

mod env;

mod registry;
pub(crate) use registry::OwnedTasks;

mod waker;

/// Scheduler trait
pub(crate) trait Schedule: Clone + 'static {
    /// Push a continuation at the tail of the ready queue.
    fn schedule(&self, task: Notified) -> Result<(), SchedulerError>;

    /// The task is done, drop it from the registry.
    fn release(&self, task: Notified);

    /// Polling the task resulted in a panic. Decides whether the process
    /// survives it.
    fn unhandled_panic(&self, id: Id, payload: Box<dyn Any + Send>);
}

/// Receives completion of the tasks it owns. A task is credited to its owner
/// exactly once, when its body completes or panics.
pub(crate) trait TaskOwner: fmt::Debug {
    fn on_task_done(&self, id: Id);
}

/// Abstraction of everything needed to build an event loop.
pub(crate) trait EventLoop {
    type Task;

    fn add_task(&self, task: Self::Task) -> Result<(), SchedulerError>;

    fn find_task(&self) -> Option<Self::Task>;

    /// Drives `root_future` to completion, running queued work whenever it is
    /// pending. Returns once the root is done and the queue is drained.
    fn event_loop<F: Future>(&self, root_future: F) -> Result<F::Output, SchedulerError>;
}
