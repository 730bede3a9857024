//! Tasks: suspendable units of work and the ways to drive them.

mod awaiter;
pub use self::awaiter::TaskAwaiter;

pub mod id;
pub use self::id::{Id, id, parent_id, try_id};

mod state;
pub use self::state::State;
pub(crate) use self::state::TransitionToScheduled;

#[allow(clippy::module_inception)]
mod task;
pub use self::task::{Task, TaskBuilder};
