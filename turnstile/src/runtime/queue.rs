use crate::runtime::SchedulerError;
use std::collections::VecDeque;

/// What to do when a continuation is pushed onto a full [`ReadyQueue`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Refuse the push with [`SchedulerError::QueueFull`]. Existing entries
    /// are never touched.
    #[default]
    Reject,

    /// Double the capacity and accept the push.
    Grow,
}

/// Bounded FIFO of continuations that are ready to run right now.
///
/// The queue is a ring buffer: entries are pushed at the tail and popped from
/// the head. It holds no locks, every scheduler owns exactly one and only
/// touches it from its own thread.
#[derive(Debug)]
pub struct ReadyQueue<T> {
    buf: VecDeque<T>,

    capacity: usize,

    policy: OverflowPolicy,

    /// Largest length ever observed.
    high_water: usize,
}

impl<T> ReadyQueue<T> {
    #[track_caller]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        assert!(capacity > 0, "ready queue capacity must be greater than 0");

        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            high_water: 0,
        }
    }

    /// Appends a continuation at the tail.
    pub fn push_back(&mut self, item: T) -> Result<(), SchedulerError> {
        if self.buf.len() == self.capacity {
            match self.policy {
                OverflowPolicy::Reject => {
                    return Err(SchedulerError::QueueFull {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::Grow => {
                    let capacity = self.capacity.saturating_mul(2);
                    tracing::debug!(from = self.capacity, to = capacity, "growing ready queue");

                    self.buf.reserve(capacity - self.buf.len());
                    self.capacity = capacity;
                }
            }
        }

        self.buf.push_back(item);
        self.high_water = self.high_water.max(self.buf.len());
        Ok(())
    }

    /// Removes and returns the oldest continuation.
    pub fn pop_front(&mut self) -> Result<T, SchedulerError> {
        self.buf.pop_front().ok_or(SchedulerError::QueueEmpty)
    }

    /// Empty-safe variant of [`ReadyQueue::pop_front`].
    pub fn try_pop_front(&mut self) -> Option<T> {
        self.buf.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns true if the next push is guaranteed to succeed.
    pub fn has_room(&self) -> bool {
        self.policy == OverflowPolicy::Grow || self.buf.len() < self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    /// Removes every entry, oldest first.
    pub(crate) fn take_all(&mut self) -> VecDeque<T> {
        std::mem::take(&mut self.buf)
    }
}
