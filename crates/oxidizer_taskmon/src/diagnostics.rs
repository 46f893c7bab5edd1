// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

/// Throttles a repeated diagnostic action to at most once per `interval`.
///
/// Both the submitter and the poller dump queue contents when they find themselves
/// unable to make progress, but only want to do so occasionally rather than on every
/// iteration of their respective loops. `RateLimitedDump` is the single place that
/// cadence is decided, independent of which queue (or what else) is being dumped.
#[derive(Debug)]
pub(crate) struct RateLimitedDump {
    interval: Duration,
    last_dump: Option<Instant>,
}

impl RateLimitedDump {
    pub(crate) const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_dump: None,
        }
    }

    /// Runs `dump` if at least `interval` has elapsed since the last time this
    /// returned `true` (or never, on first call). Returns whether `dump` ran.
    pub(crate) fn maybe_dump(&mut self, now: Instant, dump: impl FnOnce()) -> bool {
        let should_dump = match self.last_dump {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };

        if should_dump {
            dump();
            self.last_dump = Some(now);
        }

        should_dump
    }
}
