use crate::runtime::local;
use crate::runtime::{Handle, OverflowPolicy, SchedulerError, Throttler};
use crate::task::{Id, Task};
use anyhow::Result;

/// Default capacity of the ready queue.
pub(crate) const QUEUE_CAPACITY: usize = 256;

/// What to do when a task body panics.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhandledPanic {
    /// Log the panic and abort the process. A panicking task leaves the
    /// cooperative schedule in an unknown state, so nothing else is run.
    #[default]
    Abort,

    /// Release the task, crediting its owner, then resume unwinding on the
    /// thread driving the scheduler. Mostly useful in tests.
    Propagate,
}

#[derive(Debug)]
pub struct Builder {
    /// Capacity of the ready queue.
    queue_capacity: usize,

    /// What happens when a task is pushed onto a full ready queue.
    queue_overflow: OverflowPolicy,

    /// What happens when a task body panics.
    unhandled_panic: UnhandledPanic,
}

impl Builder {
    /// Returns a new builder for a scheduler living on the current thread.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new_local() -> Builder {
        Builder {
            queue_capacity: QUEUE_CAPACITY,
            queue_overflow: OverflowPolicy::default(),
            unhandled_panic: UnhandledPanic::default(),
        }
    }

    /// Maximum number of continuations the ready queue holds before the
    /// overflow policy kicks in.
    ///
    /// Defaults to 256.
    #[track_caller]
    pub fn queue_capacity(mut self, val: usize) -> Self {
        assert!(val > 0, "queue_capacity must be greater than 0");
        self.queue_capacity = val;
        self
    }

    pub fn queue_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.queue_overflow = policy;
        self
    }

    pub fn unhandled_panic(mut self, policy: UnhandledPanic) -> Self {
        self.unhandled_panic = policy;
        self
    }

    /// Applies the environment variables that are set on top of the current
    /// configuration:
    ///
    /// | Variable | Values |
    /// |----------|--------|
    /// | `TURNSTILE_QUEUE_CAPACITY` | integer greater than 0 |
    /// | `TURNSTILE_QUEUE_OVERFLOW` | `reject`, `grow` |
    /// | `TURNSTILE_UNHANDLED_PANIC` | `abort`, `propagate` |
    pub fn with_env_overrides(self) -> Result<Self, SchedulerError> {
        crate::runtime::env::apply_env_overrides(self, |name| std::env::var(name).ok())
    }

    /// Creates the configured `Runtime`.
    ///
    /// The returned `Runtime` is ready to spawn tasks. Nothing runs until the
    /// queue is drained or a future is driven with `block_on`.
    pub fn try_build(self) -> Result<Runtime> {
        let cfg = RuntimeConfig::try_from(self)?;
        let handle = local::Scheduler::new(&cfg).into_handle();

        tracing::debug!(
            capacity = cfg.queue_capacity,
            overflow = ?cfg.queue_overflow,
            unhandled_panic = ?cfg.unhandled_panic,
            "built local runtime"
        );

        Ok(Runtime { handle })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new_local()
    }
}

/// Owns a single-threaded scheduler.
///
/// Any number of runtimes may live on the same thread, each with its own
/// ready queue. Dropping the runtime drops every task that did not complete.
#[derive(Debug)]
pub struct Runtime {
    handle: Handle,
}

impl Runtime {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Drives `future` to completion, running queued tasks whenever it is
    /// pending. Returns once the future is done and the queue is drained.
    ///
    /// When the future is pending and no task is runnable, the thread parks
    /// until the future or a task is woken, possibly from another thread.
    ///
    /// # Panics
    ///
    /// Panics if the future is pending with nothing runnable and kept no
    /// clone of its waker, since nothing can ever wake it.
    #[track_caller]
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Queues `task` with no owner. See [`Handle::spawn`].
    pub fn spawn(&self, task: Task) -> Result<Id, SchedulerError> {
        self.handle.spawn(task)
    }

    /// Creates a throttler admitting at most `limit` tasks at once onto this
    /// runtime's queue.
    #[track_caller]
    pub fn throttler(&self, limit: usize) -> Throttler {
        Throttler::new(&self.handle, limit)
    }

    /// Shuts the runtime down, dropping every task still registered without
    /// running it.
    pub fn shutdown(self) {
        // Drop does the work.
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

// Export runtime builder as a RuntimeConfig object consumed by the scheduler.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) queue_capacity: usize,
    pub(crate) queue_overflow: OverflowPolicy,
    pub(crate) unhandled_panic: UnhandledPanic,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            queue_capacity: QUEUE_CAPACITY,
            queue_overflow: OverflowPolicy::default(),
            unhandled_panic: UnhandledPanic::default(),
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<(), SchedulerError> {
        if self.queue_capacity == 0 {
            return Err(SchedulerError::Config(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = RuntimeConfig {
            queue_capacity: builder.queue_capacity,
            queue_overflow: builder.queue_overflow,
            unhandled_panic: builder.unhandled_panic,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::env::{ENV_QUEUE_CAPACITY, ENV_QUEUE_OVERFLOW, ENV_UNHANDLED_PANIC};
    use crate::test_utils::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    assert_impl_all!(RuntimeConfig: Send, Sync, Clone);
    assert_not_impl_any!(Runtime: Send, Sync);

    #[test]
    fn test_builder_defaults() -> Result<()> {
        let cfg = RuntimeConfig::try_from(Builder::new_local())?;

        assert_eq!(cfg.queue_capacity, QUEUE_CAPACITY);
        assert_eq!(cfg.queue_overflow, OverflowPolicy::Reject);
        assert_eq!(cfg.unhandled_panic, UnhandledPanic::Abort);
        Ok(())
    }

    #[test]
    fn test_builder_options() -> Result<()> {
        let runtime = Builder::new_local()
            .queue_capacity(8)
            .queue_overflow(OverflowPolicy::Grow)
            .unhandled_panic(UnhandledPanic::Propagate)
            .try_build()?;

        let stats = runtime.handle().stats();
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.queued, 0);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "queue_capacity must be greater than 0")]
    fn test_zero_queue_capacity_panics() {
        let _ = Builder::new_local().queue_capacity(0);
    }

    const ALL_VARS: [&str; 3] = [ENV_QUEUE_CAPACITY, ENV_QUEUE_OVERFLOW, ENV_UNHANDLED_PANIC];

    // Sets `vars` on a clean environment for the duration of `f`, then unsets
    // them.
    fn with_envs<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock();

        // SAFETY: every test reading or writing the environment holds
        // `env_lock`.
        unsafe {
            for k in ALL_VARS {
                std::env::remove_var(k);
            }
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
        }

        let result = f();

        unsafe {
            for (k, _) in vars {
                std::env::remove_var(k);
            }
        }
        result
    }

    #[test]
    fn test_with_env_overrides_reads_process_env() -> Result<()> {
        let runtime = with_envs(
            &[
                (ENV_QUEUE_CAPACITY, "12"),
                (ENV_QUEUE_OVERFLOW, "grow"),
            ],
            || {
                Builder::new_local()
                    .queue_capacity(4)
                    .with_env_overrides()?
                    .unhandled_panic(UnhandledPanic::Propagate)
                    .try_build()
            },
        )?;

        assert_eq!(runtime.handle().stats().capacity, 12);
        Ok(())
    }

    #[test]
    fn test_with_env_overrides_rejects_bad_value() {
        let res = with_envs(&[(ENV_UNHANDLED_PANIC, "ignore")], || {
            Builder::new_local().with_env_overrides()
        });

        match res {
            Err(SchedulerError::Config(msg)) => assert!(msg.contains(ENV_UNHANDLED_PANIC), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_with_env_overrides_unset_keeps_builder() -> Result<()> {
        let builder = with_envs(&[], || {
            Builder::new_local().queue_capacity(3).with_env_overrides()
        })?;

        let cfg = RuntimeConfig::try_from(builder)?;
        assert_eq!(cfg.queue_capacity, 3);
        assert_eq!(cfg.queue_overflow, OverflowPolicy::Reject);
        Ok(())
    }

    #[test]
    fn test_block_on_returns_root_output() -> Result<()> {
        let runtime = local_runtime()?;
        let journal = Journal::default();

        runtime.spawn(stepper("a", 2, &journal))?;

        let out = runtime.block_on(async {
            crate::yield_now().await;
            42
        });

        assert_eq!(out, 42);
        assert_eq!(journal.entries(), ["a0", "a1"]);
        Ok(())
    }

    #[test]
    fn test_shutdown_drops_pending_tasks() -> Result<()> {
        let runtime = local_runtime()?;
        let witness = std::rc::Rc::new(());

        let captured = witness.clone();
        runtime.spawn(Task::new(async move {
            let _keep = captured;
            futures::future::pending::<()>().await;
        }))?;
        runtime.handle().run();

        assert_eq!(std::rc::Rc::strong_count(&witness), 2);
        runtime.shutdown();
        assert_eq!(std::rc::Rc::strong_count(&witness), 1);
        Ok(())
    }

    #[test]
    fn test_shutdown_breaks_handle_cycle() -> Result<()> {
        let runtime = local_runtime()?;
        let handle = runtime.handle().clone();

        // The task keeps its own scheduler alive.
        let captured = handle.clone();
        runtime.spawn(Task::new(async move {
            let _keep = captured;
            futures::future::pending::<()>().await;
        }))?;
        handle.run();

        drop(runtime);
        assert_eq!(handle.stats().registered, 0);
        Ok(())
    }
}
