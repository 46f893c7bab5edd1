// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::sync::Mutex;

use crate::ERR_POISONED_LOCK;

/// A per-poll-cycle aggregation shared by every [`BatchHandler`][crate::BatchHandler]
/// of the same concrete type.
///
/// The monitor creates one `BatchContext` per handler concrete type at the start of
/// each poll cycle (if at least one batch-aware handler of that type is currently
/// running), attaches it to every handler of that type before status probing, and
/// discards it at the end of the cycle. What gets stored inside is entirely
/// backend-specific -- this crate only provides the type-erased slot and the
/// synchronization around it; the backend's `check_if_completed` implementation
/// decides what collective probe to perform and how to stash/retrieve its result.
#[derive(Debug)]
pub struct BatchContext {
    state: Mutex<Option<Box<dyn Any + Send>>>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchContext {
    /// Creates a fresh, empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Runs `f` against the context's collector, initializing it with `init` on first
    /// access within this poll cycle. Every batch-aware handler of the same concrete
    /// type observes the same collector instance for the lifetime of the context.
    ///
    /// # Panics
    ///
    /// Panics if a previous access stored a value of a different type `T` -- this
    /// indicates two different handler implementations mistakenly sharing one
    /// `BatchContext`, which should never happen since contexts are keyed per
    /// concrete handler type by the poller.
    pub fn with<T, R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Send,
    {
        let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);

        let state = guard.get_or_insert_with(|| Box::new(init()));

        let typed = state
            .downcast_mut::<T>()
            .expect("BatchContext accessed with mismatched collector type");

        f(typed)
    }
}

/// A coalescing aggregator for `kill()` calls made during session cleanup.
///
/// Analogous to [`BatchContext`] but scoped to the cleanup drain rather than a poll
/// cycle: the monitor creates one per cleanup pass, attaches it to every
/// [`GridHandler`][crate::GridHandler] it kills, and calls [`BatchCleanup::kill`] once
/// after the drain to let the backend flush any coalesced termination request.
#[derive(Debug, Default)]
pub struct BatchCleanup {
    state: Mutex<Option<Box<dyn Any + Send>>>,
}

impl BatchCleanup {
    /// Creates a fresh, empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the aggregator's collector, initializing it with `init` on
    /// first access.
    ///
    /// # Panics
    ///
    /// Panics if a previous access stored a value of a different type `T`. See
    /// [`BatchContext::with`] for the rationale -- the same invariant applies here.
    pub fn with<T, R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Any + Send,
    {
        let mut guard = self.state.lock().expect(ERR_POISONED_LOCK);

        let state = guard.get_or_insert_with(|| Box::new(init()));

        let typed = state
            .downcast_mut::<T>()
            .expect("BatchCleanup accessed with mismatched collector type");

        f(typed)
    }

    /// Flushes whatever was aggregated via [`BatchCleanup::with`]. Backend code is
    /// expected to call this once, after every handler has had a chance to register
    /// its kill request, to issue a single coalesced termination call.
    ///
    /// The default no-op is appropriate for aggregators nobody registered work with.
    pub fn kill(&self) {
        // Intentionally empty: flushing is driven by whatever the backend stored via
        // `with`, which it is responsible for flushing itself (e.g. by storing a
        // `Vec` of ids and draining it here via a downcast). The hook exists so
        // cleanup has a single, well-defined place to call regardless of what backend
        // is in play.
    }
}
