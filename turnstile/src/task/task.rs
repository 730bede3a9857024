use crate::runtime::TaskOwner;
use crate::task::id::TaskIdGuard;
use crate::task::{Id, State, TransitionToScheduled};
use futures::future::LocalBoxFuture;
use futures::task::noop_waker_ref;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A suspendable unit of work.
///
/// A task is created suspended at its first instruction and does nothing until
/// it is resumed. There are three ways to drive it:
///
/// - hand it to a scheduler with [`Handle::spawn`] or [`Throttler::spawn`],
/// - `.await` it from inside another task, which chains it to the awaiting
///   task and bypasses the ready queue,
/// - step it by hand with [`Task::resume`].
///
/// Spawning and awaiting both consume the task, so a task can never be
/// scheduled twice.
///
/// [`Handle::spawn`]: crate::runtime::Handle::spawn
/// [`Throttler::spawn`]: crate::runtime::Throttler::spawn
pub struct Task {
    id: Id,

    name: Option<String>,

    state: State,

    /// Released as soon as the body completes.
    future: Option<LocalBoxFuture<'static, ()>>,

    /// Credited once, when the body completes.
    owner: Option<Rc<dyn TaskOwner>>,

    /// Task that awaited this one, if any.
    parent: Option<Id>,

    /// Set when the task is registered with a scheduler.
    waker: Option<Waker>,

    polls: u64,
}

impl Task {
    /// Creates a new task, suspended before the first instruction of `future`.
    pub fn new<F>(future: F) -> Task
    where
        F: Future<Output = ()> + 'static,
    {
        TaskBuilder::default().build(future)
    }

    /// Returns a builder to configure the task before creating it.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Returns true once the body has run off its end.
    pub fn is_finished(&self) -> bool {
        self.state.is_complete()
    }

    /// Id of the task that awaited this one. Only set once the task is
    /// awaited, read from inside the body through [`task::parent_id`].
    ///
    /// [`task::parent_id`]: crate::task::parent_id
    pub(crate) fn parent(&self) -> Option<Id> {
        self.parent
    }

    /// Number of times the body was polled.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Runs the task until its next suspension point and reports whether it is
    /// now finished.
    ///
    /// Resuming a finished task is a no-op. A yield inside a task driven this
    /// way suspends it and hands control back to the caller; the task is not
    /// placed on any ready queue since the caller still owns it.
    pub fn resume(&mut self) -> bool {
        if self.is_finished() {
            return true;
        }

        let mut cx = Context::from_waker(noop_waker_ref());
        self.poll_step(&mut cx).is_ready()
    }

    /// Polls the body once with the given context.
    ///
    /// On completion the future is dropped and the owner, if any, is credited.
    pub(crate) fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(future) = self.future.as_mut() else {
            return Poll::Ready(());
        };

        self.state.transition_to_running();
        self.polls += 1;

        let res = {
            let _guard = TaskIdGuard::enter(self.id, self.parent);
            future.as_mut().poll(cx)
        };

        match res {
            Poll::Ready(()) => {
                self.complete();
                Poll::Ready(())
            }
            Poll::Pending => {
                self.state.transition_to_idle();
                Poll::Pending
            }
        }
    }

    /// Moves the task to `Complete`, drops its future and notifies the owner.
    /// Calling it again is a no-op.
    pub(crate) fn complete(&mut self) {
        self.state.transition_to_complete();
        self.future = None;

        if let Some(owner) = self.owner.take() {
            owner.on_task_done(self.id);
        }
    }

    pub(crate) fn set_owner(&mut self, owner: Rc<dyn TaskOwner>) {
        debug_assert!(self.owner.is_none(), "task {} already has an owner", self.id);
        self.owner = Some(owner);
    }

    pub(crate) fn has_owner(&self) -> bool {
        self.owner.is_some()
    }

    pub(crate) fn set_parent(&mut self, parent: Id) {
        self.parent.get_or_insert(parent);
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub(crate) fn transition_to_scheduled(&mut self) -> TransitionToScheduled {
        self.state.transition_to_scheduled()
    }

    pub(crate) fn bind_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    pub(crate) fn waker(&self) -> Option<&Waker> {
        self.waker.as_ref()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("owned", &self.owner.is_some())
            .field("polls", &self.polls)
            .finish()
    }
}

/// Configures a [`Task`] before it is created.
///
/// # Example
///
/// ```
/// use turnstile::Task;
///
/// let task = Task::builder().name("ingest").build(async {
///     turnstile::yield_now().await;
/// });
/// assert_eq!(task.name(), Some("ingest"));
/// ```
#[derive(Debug, Default)]
pub struct TaskBuilder {
    name: Option<String>,
}

impl TaskBuilder {
    /// Name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build<F>(self, future: F) -> Task
    where
        F: Future<Output = ()> + 'static,
    {
        Task {
            id: Id::next(),
            name: self.name,
            state: State::Idle,
            future: Some(Box::pin(future)),
            owner: None,
            parent: None,
            waker: None,
            polls: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct CountingOwner {
        done: Cell<usize>,
    }

    impl TaskOwner for CountingOwner {
        fn on_task_done(&self, _id: Id) {
            self.done.set(self.done.get() + 1);
        }
    }

    #[test]
    fn test_task_created_suspended() {
        let journal = Journal::default();
        let task = stepper("a", 2, &journal);

        assert_eq!(task.state(), State::Idle);
        assert_eq!(task.polls(), 0);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_resume_runs_to_next_suspension_point() {
        let journal = Journal::default();
        let mut task = stepper("a", 2, &journal);

        assert!(!task.resume());
        assert_eq!(journal.entries(), ["a0"]);
        assert_eq!(task.state(), State::Idle);

        assert!(!task.resume());
        assert_eq!(journal.entries(), ["a0", "a1"]);

        assert!(task.resume());
        assert!(task.is_finished());
        assert_eq!(task.polls(), 3);
    }

    #[test]
    fn test_resume_finished_task_is_noop() {
        let mut task = Task::new(async {});

        assert!(task.resume());
        assert_eq!(task.polls(), 1);

        assert!(task.resume());
        assert!(task.resume());
        assert_eq!(task.polls(), 1);
        assert_eq!(task.state(), State::Complete);
    }

    #[test]
    fn test_owner_notified_exactly_once() {
        let owner = Rc::new(CountingOwner::default());
        let mut task = stepper("a", 1, &Journal::default());
        task.set_owner(owner.clone());

        assert!(!task.resume());
        assert_eq!(owner.done.get(), 0);

        assert!(task.resume());
        assert_eq!(owner.done.get(), 1);

        task.resume();
        task.complete();
        assert_eq!(owner.done.get(), 1);
        assert!(!task.has_owner());
    }

    #[test]
    fn test_future_released_on_completion() {
        let witness = Rc::new(());
        let captured = witness.clone();

        let mut task = Task::new(async move {
            let _keep = captured;
        });
        assert_eq!(Rc::strong_count(&witness), 2);

        assert!(task.resume());
        assert_eq!(Rc::strong_count(&witness), 1);
    }

    #[test]
    fn test_task_id_visible_inside_body() {
        let seen = Rc::new(Cell::new(None));
        let inner = seen.clone();

        let mut task = Task::new(async move {
            inner.set(crate::task::try_id());
        });
        let id = task.id();

        task.resume();
        assert_eq!(seen.get(), Some(id));
        assert_eq!(crate::task::try_id(), None);
    }
}
