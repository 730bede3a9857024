use crate::task::Id;
use std::any::Any;
use std::fmt;

/// A centralized error type for all scheduler and throttler operations.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("Ready queue is full (capacity: {capacity}), cannot schedule task")]
    QueueFull { capacity: usize },

    #[error("Ready queue is empty, nothing to pop")]
    QueueEmpty,

    #[error("Throttler budget exhausted (limit: {limit}) and no queued task can restore it")]
    BudgetExhausted { limit: usize },

    #[error("Task {id} already ran to completion and cannot be spawned")]
    AlreadyComplete { id: Id },

    #[error("Root future is pending but nothing can wake it: no runnable task left")]
    RootStalled,

    #[error("Invalid runtime configuration: {0}")]
    Config(String),
}

impl PartialEq for SchedulerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::QueueFull { capacity: a }, Self::QueueFull { capacity: b }) => a == b,
            (Self::QueueEmpty, Self::QueueEmpty) => true,
            (Self::BudgetExhausted { limit: a }, Self::BudgetExhausted { limit: b }) => a == b,
            (Self::AlreadyComplete { id: a }, Self::AlreadyComplete { id: b }) => a == b,
            (Self::RootStalled, Self::RootStalled) => true,
            (Self::Config(a), Self::Config(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicReason {
    /// A task body panicked while being polled.
    TaskPanicked,

    /// The scheduler's own bookkeeping is inconsistent.
    InvalidState,

    Unknown,
}

/// Describes a panic caught by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPanic {
    pub reason: PanicReason,
    pub task: Option<Id>,
    pub message: String,
}

impl SchedulerPanic {
    pub(crate) fn new(reason: PanicReason, task: Option<Id>, message: impl Into<String>) -> Self {
        Self {
            reason,
            task,
            message: message.into(),
        }
    }

    pub(crate) fn from_task_payload(id: Id, payload: &(dyn Any + Send)) -> Self {
        if let Some(inner) = payload.downcast_ref::<SchedulerPanic>() {
            return inner.clone();
        }

        let message = panic_payload_as_str(payload).unwrap_or("unknown");
        Self::new(PanicReason::TaskPanicked, Some(id), message)
    }
}

impl fmt::Display for SchedulerPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.task {
            Some(id) => write!(f, "{:?} in task {}: {}", self.reason, id, self.message),
            None => write!(f, "{:?}: {}", self.reason, self.message),
        }
    }
}

pub(crate) fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Some(s.as_str())
    } else {
        None
    }
}
