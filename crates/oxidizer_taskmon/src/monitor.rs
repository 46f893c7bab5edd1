// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::batch::BatchCleanup;
use crate::config::MonitorConfig;
use crate::constants::ERR_POISONED_LOCK;
use crate::error::{Error, Result};
use crate::handler::{Outcome, TaskHandler};
use crate::queues::{PendingQueue, RunningQueue, TaskHandle};
use crate::session::Session;
use crate::{poller, submitter};

/// State shared between the `Monitor` facade and its two background threads.
///
/// Lock roles mirror the concurrency model exactly: `pending` guards both queues plus
/// the *task available* and *slot available* predicates; `complete` guards only the
/// *task completed* predicate, kept separate so a backend's `signal()` never contends
/// with producers calling `schedule`.
pub(crate) struct Shared {
    pub(crate) session: Arc<dyn Session>,
    pub(crate) config: MonitorConfig,
    pub(crate) pending: Mutex<PendingState>,
    pub(crate) task_available: Condvar,
    pub(crate) slot_available: Condvar,
    pub(crate) complete: Mutex<()>,
    pub(crate) task_completed: Condvar,
    next_handle: AtomicU64,
}

pub(crate) struct PendingState {
    pub(crate) pending: PendingQueue,
    pub(crate) running: RunningQueue,
}

impl Shared {
    /// Removes a running handler by handle, notifying *slot available* if anything
    /// was actually removed. Shared by the public `evict` API and the poller's own
    /// eviction of naturally-completed handlers, so the notification is never
    /// forgotten by either caller.
    pub(crate) fn take_running(&self, handle: TaskHandle) -> Option<Box<dyn TaskHandler>> {
        let mut state = self.pending.lock().expect(ERR_POISONED_LOCK);
        let removed = state.running.remove(handle);
        drop(state);

        if removed.is_some() {
            self.slot_available.notify_one();
        }

        removed
    }
}

struct MonitorThreads {
    submitter: thread::JoinHandle<()>,
    poller: thread::JoinHandle<()>,
}

/// Process-wide coordination object for one executor: owns both queues and the
/// condition variables, and exposes `schedule`/`evict`/`signal` to producers.
///
/// A `Monitor` is created once per executor name. `start()` registers with the
/// session's shutdown barrier and launches the `Submitter` and `Poller` threads;
/// `cleanup` (triggered automatically via the session's shutdown hook) drains
/// `RunningQueue` deterministically.
pub struct Monitor {
    shared: Arc<Shared>,
    threads: Mutex<Option<MonitorThreads>>,
}

impl Monitor {
    /// Creates a monitor for the given executor configuration, bound to `session` for
    /// the lifetime of the monitor.
    #[must_use]
    pub fn new(config: MonitorConfig, session: Arc<dyn Session>) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                config,
                pending: Mutex::new(PendingState {
                    pending: PendingQueue::new(),
                    running: RunningQueue::new(),
                }),
                task_available: Condvar::new(),
                slot_available: Condvar::new(),
                complete: Mutex::new(()),
                task_completed: Condvar::new(),
                next_handle: AtomicU64::new(0),
            }),
            threads: Mutex::new(None),
        }
    }

    /// Appends `handler` to the pending queue and wakes the submitter, whether it was
    /// idle (no work) or blocked (no slot). Never blocks the caller.
    pub fn schedule(&self, handler: Box<dyn TaskHandler>) -> TaskHandle {
        let handle = TaskHandle::from_raw(self.shared.next_handle.fetch_add(1, Ordering::SeqCst));

        let mut state = self.shared.pending.lock().expect(ERR_POISONED_LOCK);
        state.pending.push_back(handle, handler);
        drop(state);

        self.shared.task_available.notify_one();
        self.shared.slot_available.notify_one();

        handle
    }

    /// Removes a handler from the running queue ahead of its natural completion.
    /// Returns `true` on removal, `false` on the second and subsequent calls for the
    /// same handle.
    pub fn evict(&self, handle: TaskHandle) -> bool {
        self.shared.take_running(handle).is_some()
    }

    /// Wakes the poller early. Backends with asynchronous completion notifications
    /// call this to shorten the poller's next sleep rather than waiting out the full
    /// poll interval.
    pub fn signal(&self) {
        let guard = self.shared.complete.lock().expect(ERR_POISONED_LOCK);
        self.shared.task_completed.notify_one();
        drop(guard);
    }

    /// Registers with the session's shutdown barrier, installs the cleanup shutdown
    /// hook, and launches the submitter and poller threads. Barrier registration is
    /// performed before any thread is spawned, so the session can never observe an
    /// unregistered monitor and terminate early.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Programming`] if the monitor has already been started.
    #[tracing::instrument(skip(self), fields(executor = %self.shared.config.name()))]
    pub fn start(&self) -> Result<()> {
        let mut threads = self.threads.lock().expect(ERR_POISONED_LOCK);

        if threads.is_some() {
            return Err(Error::Programming(
                "monitor already started".to_string(),
            ));
        }

        self.shared.session.register_with_barrier();

        let cleanup_shared = Arc::clone(&self.shared);
        self.shared
            .session
            .on_shutdown(Box::new(move || cleanup(&cleanup_shared)));

        let submitter_shared = Arc::clone(&self.shared);
        let submitter = thread::Builder::new()
            .name(format!("{}-submitter", self.shared.config.name()))
            .spawn(move || submitter::run(&submitter_shared))
            .expect("failed to spawn submitter thread");

        let poller_shared = Arc::clone(&self.shared);
        let poller = thread::Builder::new()
            .name(format!("{}-poller", self.shared.config.name()))
            .spawn(move || poller::run(&poller_shared))
            .expect("failed to spawn poller thread");

        *threads = Some(MonitorThreads { submitter, poller });

        tracing::info!(executor = self.shared.config.name(), "monitor started");

        Ok(())
    }

    /// Blocks until the submitter and poller threads started by [`Monitor::start`]
    /// have exited. Intended for tests and orderly shutdown sequencing; panics if the
    /// monitor was never started.
    pub fn join(&self) {
        let threads = self
            .threads
            .lock()
            .expect(ERR_POISONED_LOCK)
            .take()
            .expect("monitor was never started");

        threads.submitter.join().expect("submitter thread panicked");
        threads.poller.join().expect("poller thread panicked");
    }

    /// Number of handlers currently dispatched and awaiting terminal status.
    #[must_use]
    pub fn running_len(&self) -> usize {
        self.shared.pending.lock().expect(ERR_POISONED_LOCK).running.len()
    }

    /// Number of handlers scheduled but not yet dispatched.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().expect(ERR_POISONED_LOCK).pending.len()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

/// Drains the running queue, giving every handler a chance to be killed and grid-aware
/// handlers a shared [`BatchCleanup`] to coalesce their termination requests. Run once
/// on session shutdown via the hook registered by [`Monitor::start`].
fn cleanup(shared: &Shared) {
    tracing::info!(executor = shared.config.name(), "monitor cleanup draining running queue");

    let mut cleanup_contexts: HashMap<TypeId, Arc<BatchCleanup>> = HashMap::new();

    loop {
        let popped = {
            let mut state = shared.pending.lock().expect(ERR_POISONED_LOCK);
            state.running.pop_front()
        };

        let Some((_handle, mut handler)) = popped else {
            break;
        };

        if let Some(grid) = handler.as_grid_handler() {
            let type_id = grid.as_any().type_id();
            let context = cleanup_contexts
                .entry(type_id)
                .or_insert_with(|| Arc::new(BatchCleanup::new()))
                .clone();
            grid.attach_cleanup(context);
        }

        if let Err(error) = handler.kill() {
            tracing::warn!(task = handler.name(), error = %error, "kill failed during cleanup");
        }

        let task = handler.task().clone();
        task.processor().count_down();
        shared.session.notify_task_complete(&task, Outcome::Aborted);
        shared.slot_available.notify_one();
    }

    for context in cleanup_contexts.values() {
        context.kill();
    }

    tracing::info!(executor = shared.config.name(), "monitor cleanup complete");
}
