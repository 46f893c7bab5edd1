// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Instant;

use crate::constants::ERR_POISONED_LOCK;
use crate::diagnostics::RateLimitedDump;
use crate::handler::{Outcome, TaskHandler};
use crate::monitor::{PendingState, Shared};
use crate::queues::TaskHandle;

/// Drains the pending queue into the running queue while the configured submission
/// policy allows, blocking whenever there is nothing to do. Runs for the lifetime of
/// the owning `Monitor`; returns once the session is aborted or cancelled.
pub(crate) fn run(shared: &Shared) {
    let mut dump = RateLimitedDump::new(shared.config.dump_interval());
    let mut state = shared.pending.lock().expect(ERR_POISONED_LOCK);

    loop {
        while state.pending.is_empty() {
            if session_halted(shared) {
                tracing::debug!(executor = shared.config.name(), "submitter stopping: no pending work and session halted");
                return;
            }

            state = shared
                .task_available
                .wait_timeout(state, shared.config.poll_interval())
                .expect(ERR_POISONED_LOCK)
                .0;
        }

        if session_halted(shared) {
            tracing::debug!(executor = shared.config.name(), "submitter stopping: session halted");
            return;
        }

        let mut submitted = 0_usize;

        while !session_halted(shared) {
            let Some((handle, handler)) = state.pending.pop_front() else {
                break;
            };

            if !shared.config.can_submit(handler.as_ref(), state.running.len()) {
                state.pending.push_front(handle, handler);
                break;
            }

            submit_one(shared, &mut state, handle, handler);
            submitted += 1;
        }

        if submitted == 0 {
            let pending_len = state.pending.len();
            let name = shared.config.name();

            dump.maybe_dump(Instant::now(), || {
                tracing::debug!(
                    executor = name,
                    pending = pending_len,
                    "submitter stalled: no running-queue capacity"
                );
            });

            state = shared
                .slot_available
                .wait_timeout(state, shared.config.poll_interval())
                .expect(ERR_POISONED_LOCK)
                .0;
        }
    }
}

fn session_halted(shared: &Shared) -> bool {
    shared.session.is_aborted() || shared.session.is_cancelled()
}

/// Dispatches one handler to the backend. On success it is promoted into the running
/// queue; on failure it is routed through its processor's fault policy and reported
/// complete without ever occupying a slot.
fn submit_one(
    shared: &Shared,
    state: &mut PendingState,
    handle: TaskHandle,
    mut handler: Box<dyn TaskHandler>,
) {
    match handler.submit() {
        Ok(()) => {
            shared.session.notify_task_submit(handler.task());
            state.running.push_back(handle, handler);
        }
        Err(error) => {
            let task = handler.task().clone();
            tracing::warn!(task = task.name(), error = %error, "task submission failed");

            let fault = task.processor().resume_or_die(&error);
            task.processor().count_down();
            shared.session.notify_task_complete(&task, Outcome::Failed);

            if let Some(fault) = fault {
                shared.session.fault(fault);
            }
        }
    }
}
