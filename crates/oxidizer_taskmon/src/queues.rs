// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::fmt;

use crate::TaskHandler;

/// An opaque, cheaply cloneable identifier for a handler scheduled with a
/// [`Monitor`][crate::Monitor].
///
/// Callers use this to refer back to a specific handler (e.g. for
/// [`Monitor::evict`][crate::Monitor::evict]) without the monitor needing any
/// equality or hashing support from `TaskHandler` implementations themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub(crate) const fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An unbounded FIFO of handlers that have been scheduled but not yet dispatched.
///
/// Invariant: every member has never had `submit()` called.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: VecDeque<(TaskHandle, Box<dyn TaskHandler>)>,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the back of the queue, preserving submission order for
    /// this producer.
    pub fn push_back(&mut self, handle: TaskHandle, handler: Box<dyn TaskHandler>) {
        self.items.push_back((handle, handler));
    }

    /// Removes and returns the handler at the front of the queue, if any.
    pub fn pop_front(&mut self) -> Option<(TaskHandle, Box<dyn TaskHandler>)> {
        self.items.pop_front()
    }

    /// Re-inserts a handler at the front of the queue, restoring FIFO order when a
    /// handler popped for a submission attempt turns out not to be submittable yet.
    pub(crate) fn push_front(&mut self, handle: TaskHandle, handler: Box<dyn TaskHandler>) {
        self.items.push_front((handle, handler));
    }

    /// Number of handlers currently waiting to be dispatched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if no handlers are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Diagnostic names of every pending handler, front to back.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(_, handler)| handler.name())
    }
}

/// A bounded FIFO of handlers that have been dispatched and are awaiting terminal
/// status.
///
/// Invariant: every member has returned successfully from `submit()` and has not yet
/// been evicted. Capacity enforcement is the [`Submitter`][crate::Monitor]'s
/// responsibility via `can_submit`; this type itself does not refuse insertions, the
/// same way the source queue's bound is a policy enforced by its caller rather than
/// the queue refusing pushes past some hard limit.
#[derive(Debug, Default)]
pub struct RunningQueue {
    items: VecDeque<(TaskHandle, Box<dyn TaskHandler>)>,
}

impl RunningQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the back of the queue.
    pub fn push_back(&mut self, handle: TaskHandle, handler: Box<dyn TaskHandler>) {
        self.items.push_back((handle, handler));
    }

    /// Removes the handler with the given handle, if present. Returns `true` on
    /// successful removal, `false` if no handler with that handle was running (e.g.
    /// because it was already evicted).
    pub fn remove(&mut self, handle: TaskHandle) -> Option<Box<dyn TaskHandler>> {
        let position = self.items.iter().position(|(h, _)| *h == handle)?;
        self.items.remove(position).map(|(_, handler)| handler)
    }

    /// Removes and returns the handler at the front of the queue, if any.
    pub fn pop_front(&mut self) -> Option<(TaskHandle, Box<dyn TaskHandler>)> {
        self.items.pop_front()
    }

    /// Number of handlers currently dispatched and awaiting terminal status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if nothing is currently running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A snapshot of the handles currently running, in FIFO order.
    ///
    /// The poller iterates this snapshot rather than the live queue so that eviction
    /// of one handler mid-cycle (which requires the pending-queue lock) does not
    /// require holding any lock for the whole iteration.
    #[must_use]
    pub fn snapshot_handles(&self) -> Vec<TaskHandle> {
        self.items.iter().map(|(handle, _)| *handle).collect()
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(_, handler)| handler.name())
    }
}
