//! Scheduler that runs every task on the thread that drives it.

pub(crate) mod scheduler;
pub use scheduler::{Handle, SchedulerStats};

pub(crate) use scheduler::Scheduler;


pub(crate) mod worker;
