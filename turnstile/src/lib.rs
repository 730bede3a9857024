#[doc(inline)]
pub use turnstile_macros::main;

#[doc(inline)]
pub use turnstile_macros::test;

mod context;

mod future;
pub use future::{YieldNow, yield_now};

pub mod runtime;
pub use runtime::{Builder, Handle, Runtime, SchedulerError, Throttler};

pub mod task;
pub use task::Task;

mod utils;

#[cfg(test)]
mod test_utils;
