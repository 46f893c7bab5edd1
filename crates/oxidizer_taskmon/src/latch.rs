// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Condvar, Mutex};

use crate::ERR_POISONED_LOCK;

/// Lets a caller await the drain of a batch of scheduled tasks.
///
/// A `CompletionLatch` is created with the number of tasks it should wait for, handed
/// out (cloned) to each task's [`TaskProcessor`][crate::TaskProcessor], and counted
/// down once per task as the monitor evicts that task's handler (whether it completed
/// normally, failed, or was aborted during cleanup). `wait` blocks until the count
/// reaches zero.
///
/// This is the Rust stand-in for "decrement any completion latch the handler carries"
/// in the source design -- a plain `Arc<AtomicUsize>` cannot be waited upon, so this
/// pairs the counter with a `Condvar` the way the monitor's own predicates do.
#[derive(Debug, Clone)]
pub struct CompletionLatch {
    inner: Arc<LatchInner>,
}

#[derive(Debug)]
struct LatchInner {
    remaining: Mutex<usize>,
    drained: Condvar,
}

impl CompletionLatch {
    /// Creates a latch that requires `count` calls to [`CompletionLatch::count_down`]
    /// before [`CompletionLatch::wait`] returns.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(LatchInner {
                remaining: Mutex::new(count),
                drained: Condvar::new(),
            }),
        }
    }

    /// Decrements the latch by one. Safe to call more times than the initial count;
    /// the counter saturates at zero rather than panicking, since a task processor
    /// may be shared across more handlers than strictly necessary.
    pub fn count_down(&self) {
        let mut remaining = self.inner.remaining.lock().expect(ERR_POISONED_LOCK);

        *remaining = remaining.saturating_sub(1);

        if *remaining == 0 {
            self.inner.drained.notify_all();
        }
    }

    /// Blocks the calling thread until the latch has been counted down to zero.
    /// Returns immediately if it already is.
    pub fn wait(&self) {
        let remaining = self.inner.remaining.lock().expect(ERR_POISONED_LOCK);

        let _guard = self
            .inner
            .drained
            .wait_while(remaining, |remaining| *remaining > 0)
            .expect(ERR_POISONED_LOCK);
    }

    /// The number of outstanding `count_down` calls still needed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        *self.inner.remaining.lock().expect(ERR_POISONED_LOCK)
    }
}
