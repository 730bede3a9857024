/// Lifecycle of a [`Task`].
///
/// A task that is still owned by the caller is only ever `Idle` or `Complete`.
/// `Scheduled` and `Running` are reachable once the task is handed to a
/// scheduler, which then owns it until it completes.
///
/// [`Task`]: crate::task::Task
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Suspended, either at its first instruction or at a suspension point,
    /// and not waiting in any ready queue.
    #[default]
    Idle,

    /// Sitting in a ready queue, waiting for its turn.
    Scheduled,

    /// Currently being polled.
    Running,

    /// The body ran off its end. The future has been released.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToScheduled {
    /// Caller must push the task onto the ready queue.
    Submit,

    /// Task is already queued, running, or complete.
    DoNothing,
}

impl State {
    pub(crate) fn is_complete(self) -> bool {
        matches!(self, State::Complete)
    }

    /// A wake arrived for a task that is not being polled.
    pub(crate) fn transition_to_scheduled(&mut self) -> TransitionToScheduled {
        match self {
            State::Idle => {
                *self = State::Scheduled;
                TransitionToScheduled::Submit
            }
            State::Scheduled | State::Running | State::Complete => {
                TransitionToScheduled::DoNothing
            }
        }
    }

    pub(crate) fn transition_to_running(&mut self) {
        debug_assert!(
            matches!(self, State::Idle | State::Scheduled),
            "cannot run a task in state {self:?}"
        );
        *self = State::Running;
    }

    pub(crate) fn transition_to_idle(&mut self) {
        debug_assert_eq!(*self, State::Running);
        *self = State::Idle;
    }

    pub(crate) fn transition_to_complete(&mut self) {
        *self = State::Complete;
    }
}
