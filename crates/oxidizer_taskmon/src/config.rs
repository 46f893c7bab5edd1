// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::handler::TaskHandler;

/// The number of slots in the [`RunningQueue`][crate::RunningQueue].
///
/// The source system this crate's design is modeled on represents "no limit" as a
/// bare `0`, relying on every uncapped executor overriding the submission predicate.
/// That is a footgun: the default predicate silently admits nothing. This type makes
/// the "no limit" case an explicit, unmistakable variant instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// At most this many handlers may occupy the running queue at once.
    Limited(NonZeroUsize),

    /// The running queue accepts handlers without a ceiling. The default
    /// [`CanSubmit`] policy always returns `true` for this variant.
    Unbounded,
}

impl Capacity {
    /// Returns `true` if `count` additional running handlers are still permitted.
    #[must_use]
    pub const fn admits(&self, running_count: usize) -> bool {
        match self {
            Self::Limited(limit) => running_count < limit.get(),
            Self::Unbounded => true,
        }
    }
}

/// Default spacing between throttled diagnostic dumps of the pending/running queues.
pub const DEFAULT_DUMP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A pluggable predicate deciding whether a given handler may be promoted from
/// `PendingQueue` to `RunningQueue`, given the queue's current occupancy.
///
/// The default policy built by [`MonitorConfig::new`] only consults
/// [`Capacity::admits`] and ignores the handler entirely; override via
/// [`MonitorConfig::with_submission_policy`] for resource-aware placement (e.g.
/// weighting by a handler's declared footprint) without touching the submitter
/// itself.
#[derive(Clone)]
pub struct CanSubmit(Arc<dyn Fn(&dyn TaskHandler, usize) -> bool + Send + Sync>);

impl CanSubmit {
    fn from_capacity(capacity: Capacity) -> Self {
        Self(Arc::new(move |_handler, running_len| capacity.admits(running_len)))
    }

    /// Wraps an arbitrary resource-aware predicate.
    #[must_use]
    pub fn new(f: impl Fn(&dyn TaskHandler, usize) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn evaluate(&self, handler: &dyn TaskHandler, running_len: usize) -> bool {
        (self.0)(handler, running_len)
    }
}

impl fmt::Debug for CanSubmit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanSubmit").finish()
    }
}

/// Collects the configuration needed to build and start a [`Monitor`][crate::Monitor].
///
/// # Examples
///
/// ```
/// use oxidizer_taskmon::{Capacity, MonitorConfig};
/// use std::time::Duration;
///
/// let config = MonitorConfig::new("local-executor", Capacity::limited(4), Duration::from_secs(1));
///
/// assert_eq!(config.name(), "local-executor");
/// ```
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    name: String,
    capacity: Capacity,
    poll_interval: Duration,
    dump_interval: Duration,
    policy: CanSubmit,
}

impl Capacity {
    /// Convenience constructor for a limited capacity.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero. Use [`Capacity::Unbounded`] to express "no limit"
    /// instead of a capacity of zero.
    #[must_use]
    pub fn limited(count: usize) -> Self {
        Self::Limited(NonZeroUsize::new(count).expect(
            "a capacity of zero does not mean unbounded; use Capacity::Unbounded instead",
        ))
    }
}

impl MonitorConfig {
    /// Creates a new configuration with the given executor name, capacity, and poll
    /// interval. The dump interval defaults to [`DEFAULT_DUMP_INTERVAL`].
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: Capacity, poll_interval: Duration) -> Self {
        Self {
            name: name.into(),
            capacity,
            poll_interval,
            dump_interval: DEFAULT_DUMP_INTERVAL,
            policy: CanSubmit::from_capacity(capacity),
        }
    }

    /// Overrides the diagnostic dump interval.
    #[must_use]
    pub const fn with_dump_interval(mut self, dump_interval: Duration) -> Self {
        self.dump_interval = dump_interval;
        self
    }

    /// Overrides the submission predicate with a resource-aware policy. The default
    /// (built from `capacity` at construction time) only checks occupancy against the
    /// configured [`Capacity`]; a custom policy can additionally inspect the handler
    /// about to be submitted.
    #[must_use]
    pub fn with_submission_policy(mut self, policy: CanSubmit) -> Self {
        self.policy = policy;
        self
    }

    /// The executor identifier used in log lines and thread names.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured running-queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// The wall-clock cadence of the poller thread.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// The minimum spacing between diagnostic dumps of pending/running queues.
    #[must_use]
    pub const fn dump_interval(&self) -> Duration {
        self.dump_interval
    }

    /// Evaluates the configured submission policy for `handler` against the running
    /// queue's current occupancy.
    pub(crate) fn can_submit(&self, handler: &dyn TaskHandler, running_len: usize) -> bool {
        self.policy.evaluate(handler, running_len)
    }
}
