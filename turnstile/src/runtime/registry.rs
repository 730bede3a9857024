use crate::runtime::waker::{TaskWaker, WakeList};
use crate::runtime::{PanicReason, SchedulerPanic};
use crate::task::{Id, State, Task, TransitionToScheduled};
use slab::Slab;
use std::sync::Arc;

/// A continuation: points at a task registered with a scheduler.
///
/// The slab key alone is not enough since keys are reused once a task is
/// released. The id makes a continuation that outlived its task harmless: it
/// no longer matches anything and is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Notified {
    key: usize,
    id: Id,
}

impl Notified {
    pub(crate) fn new(key: usize, id: Id) -> Self {
        Self { key, id }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }
}

#[derive(Debug)]
enum Slot {
    Stored(Task),

    /// The task was checked out to be polled. Wakes that arrive meanwhile are
    /// remembered and replayed on check-in.
    Polling { id: Id, notified: bool },
}

impl Slot {
    fn id(&self) -> Id {
        match self {
            Slot::Stored(task) => task.id(),
            Slot::Polling { id, .. } => *id,
        }
    }

    fn is_polling(&self, target: Id) -> bool {
        matches!(self, Slot::Polling { id, .. } if *id == target)
    }
}

// Every task handed to a scheduler lives here until it completes, the queue
// only ever holds `Notified` continuations pointing into it. A task is taken
// out for the duration of its poll so no borrow of the registry is held while
// user code runs.
#[derive(Debug, Default)]
pub(crate) struct OwnedTasks {
    slots: Slab<Slot>,
}

impl OwnedTasks {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Slab::with_capacity(capacity),
        }
    }

    /// Registers a task and binds its waker.
    pub(crate) fn insert(&mut self, mut task: Task, wakes: &Arc<WakeList>) -> Notified {
        let entry = self.slots.vacant_entry();
        let notified = Notified::new(entry.key(), task.id());

        task.bind_waker(TaskWaker::waker(notified, wakes.clone()));
        entry.insert(Slot::Stored(task));

        notified
    }

    /// Records a wake. Returns `Submit` when the caller must push the
    /// continuation onto the ready queue.
    pub(crate) fn notify(&mut self, target: Notified) -> TransitionToScheduled {
        match self.slots.get_mut(target.key) {
            Some(Slot::Stored(task)) if task.id() == target.id => task.transition_to_scheduled(),
            Some(Slot::Polling { id, notified }) if *id == target.id => {
                *notified = true;
                TransitionToScheduled::DoNothing
            }
            _ => {
                tracing::trace!(id = %target.id, "ignoring wake for released task");
                TransitionToScheduled::DoNothing
            }
        }
    }

    /// Takes a task out to be polled. Returns `None` for a stale continuation.
    pub(crate) fn checkout(&mut self, target: Notified) -> Option<Task> {
        let slot = self.slots.get_mut(target.key)?;
        if slot.id() != target.id {
            return None;
        }

        let polling = Slot::Polling {
            id: target.id,
            notified: false,
        };

        match std::mem::replace(slot, polling) {
            Slot::Stored(task) => Some(task),
            already @ Slot::Polling { .. } => {
                *slot = already;
                None
            }
        }
    }

    /// Puts a polled task back. Returns true if it was woken while out.
    pub(crate) fn checkin(&mut self, target: Notified, task: Task) -> bool {
        let Some(slot) = self
            .slots
            .get_mut(target.key)
            .filter(|slot| slot.is_polling(target.id))
        else {
            std::panic::panic_any(SchedulerPanic::new(
                PanicReason::InvalidState,
                Some(target.id),
                "checked-in task has no polling slot",
            ));
        };

        match std::mem::replace(slot, Slot::Stored(task)) {
            Slot::Polling { notified, .. } => notified,
            Slot::Stored(_) => false,
        }
    }

    /// Removes a task for good. Returns it if it was not checked out.
    pub(crate) fn release(&mut self, target: Notified) -> Option<Task> {
        if self.slots.get(target.key)?.id() != target.id {
            return None;
        }

        match self.slots.remove(target.key) {
            Slot::Stored(task) => Some(task),
            Slot::Polling { .. } => None,
        }
    }

    /// Removes every stored task.
    pub(crate) fn take_all(&mut self) -> Vec<Task> {
        self.slots
            .drain()
            .filter_map(|slot| match slot {
                Slot::Stored(task) => Some(task),
                Slot::Polling { .. } => None,
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tasks that are pending and were never woken.
    pub(crate) fn parked(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Stored(task) if task.state() == State::Idle))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn registry() -> (OwnedTasks, Arc<WakeList>) {
        (OwnedTasks::with_capacity(4), Arc::new(WakeList::default()))
    }

    #[test]
    fn test_checkout_checkin_cycle() {
        let (mut tasks, wakes) = registry();
        let journal = Journal::default();

        let n = tasks.insert(stepper("a", 1, &journal), &wakes);
        assert_eq!(tasks.len(), 1);

        let task = tasks.checkout(n).expect("task is stored");
        assert!(tasks.checkout(n).is_none(), "already checked out");

        assert!(!tasks.checkin(n, task));
        assert!(tasks.checkout(n).is_some());
    }

    #[test]
    fn test_notify_while_polling_is_replayed() {
        let (mut tasks, wakes) = registry();
        let n = tasks.insert(stepper("a", 1, &Journal::default()), &wakes);

        let task = tasks.checkout(n).expect("task is stored");
        assert_eq!(tasks.notify(n), TransitionToScheduled::DoNothing);

        assert!(tasks.checkin(n, task));
    }

    #[test]
    fn test_notify_deduplicates() {
        let (mut tasks, wakes) = registry();
        let n = tasks.insert(stepper("a", 1, &Journal::default()), &wakes);

        assert_eq!(tasks.notify(n), TransitionToScheduled::Submit);
        assert_eq!(tasks.notify(n), TransitionToScheduled::DoNothing);
        assert_eq!(tasks.parked(), 0);
    }

    #[test]
    fn test_stale_continuation_after_key_reuse() {
        let (mut tasks, wakes) = registry();
        let journal = Journal::default();

        let old = tasks.insert(stepper("a", 1, &journal), &wakes);
        assert!(tasks.release(old).is_some());
        assert!(tasks.is_empty());

        let new = tasks.insert(stepper("b", 1, &journal), &wakes);
        assert_ne!(old, new);

        assert!(tasks.checkout(old).is_none());
        assert!(tasks.release(old).is_none());
        assert_eq!(tasks.notify(old), TransitionToScheduled::DoNothing);
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_parked_counts_idle_tasks() {
        let (mut tasks, wakes) = registry();
        let journal = Journal::default();

        let a = tasks.insert(stepper("a", 1, &journal), &wakes);
        let _b = tasks.insert(stepper("b", 1, &journal), &wakes);
        assert_eq!(tasks.parked(), 2);

        tasks.notify(a);
        assert_eq!(tasks.parked(), 1);

        assert_eq!(tasks.take_all().len(), 2);
        assert_eq!(tasks.parked(), 0);
    }

    #[test]
    #[should_panic]
    fn test_checkin_without_checkout_is_fatal() {
        let (mut tasks, wakes) = registry();
        let journal = Journal::default();

        let n = tasks.insert(stepper("a", 1, &journal), &wakes);
        tasks.checkin(n, stepper("b", 1, &journal));
    }
}
