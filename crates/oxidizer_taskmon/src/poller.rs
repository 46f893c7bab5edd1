// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::batch::BatchContext;
use crate::constants::ERR_POISONED_LOCK;
use crate::diagnostics::RateLimitedDump;
use crate::handler::{Outcome, TaskHandler};
use crate::monitor::Shared;
use crate::queues::TaskHandle;

/// Drives every handler in the running queue toward a terminal state on a fixed poll
/// cadence. Runs for the lifetime of the owning `Monitor`; returns once the session
/// has aborted, or has terminated with both queues empty.
pub(crate) fn run(shared: &Shared) {
    let mut dump = RateLimitedDump::new(shared.config.dump_interval());

    loop {
        let t0 = Instant::now();

        let handles = {
            let state = shared.pending.lock().expect(ERR_POISONED_LOCK);
            state.running.snapshot_handles()
        };

        // Phase 1: pull every handler out of the running queue and attach it to its
        // concrete type's shared `BatchContext`, if any, before any handler of that
        // type is probed. This is what lets sibling handlers of the same type
        // coalesce their status probes into a single backend call during phase 2 --
        // attaching after checking would mean each handler sees an empty context.
        let mut batch_contexts: HashMap<TypeId, Arc<BatchContext>> = HashMap::new();
        let mut taken = Vec::with_capacity(handles.len());

        for handle in handles {
            let Some(mut handler) = take_running(shared, handle) else {
                continue;
            };

            if let Some(batch_handler) = handler.as_batch_handler() {
                let type_id = batch_handler.as_any().type_id();
                let context = batch_contexts
                    .entry(type_id)
                    .or_insert_with(|| Arc::new(BatchContext::new()))
                    .clone();
                batch_handler.batch(context);
            }

            taken.push((handle, handler));
        }

        // Phase 2: every batch-aware handler of a given type has now registered with
        // its shared context, so the checks below can coalesce.
        for (handle, handler) in taken {
            poll_one(shared, handle, handler);
        }

        if should_stop(shared) {
            tracing::info!(executor = shared.config.name(), "poller stopping");
            return;
        }

        sleep_until_next_cycle(shared, t0);

        if shared.session.is_aborted() {
            tracing::info!(executor = shared.config.name(), "poller stopping after wake: session aborted");
            return;
        }

        let running_len = {
            let state = shared.pending.lock().expect(ERR_POISONED_LOCK);
            state.running.len()
        };
        let name = shared.config.name();

        dump.maybe_dump(Instant::now(), || {
            tracing::debug!(executor = name, running = running_len, "poller cycle complete");
        });
    }
}

/// Advances an already-taken handler (already attached to its batch context, if any)
/// through `check_if_running`/`check_if_completed`, and either re-inserts it into the
/// running queue or evicts it for good depending on the outcome.
fn poll_one(shared: &Shared, handle: TaskHandle, mut handler: Box<dyn TaskHandler>) {
    match handler.check_if_running() {
        Ok(true) => shared.session.notify_task_start(handler.task()),
        Ok(false) => {}
        Err(error) => return fail_handler(shared, handler, &error),
    }

    match handler.check_if_completed() {
        Ok(true) => complete_handler(shared, handler),
        Ok(false) => reinsert_running(shared, handle, handler),
        Err(error) => fail_handler(shared, handler, &error),
    }
}

fn take_running(shared: &Shared, handle: TaskHandle) -> Option<Box<dyn TaskHandler>> {
    let mut state = shared.pending.lock().expect(ERR_POISONED_LOCK);
    state.running.remove(handle)
}

fn reinsert_running(shared: &Shared, handle: TaskHandle, handler: Box<dyn TaskHandler>) {
    let mut state = shared.pending.lock().expect(ERR_POISONED_LOCK);
    state.running.push_back(handle, handler);
}

/// The handler reached a terminal state on its own: finalize, count down any
/// completion latch, and notify the session.
fn complete_handler(shared: &Shared, handler: Box<dyn TaskHandler>) {
    let task = handler.task().clone();
    let fault = task.processor().finalize();
    task.processor().count_down();
    shared.session.notify_task_complete(&task, Outcome::Completed);
    shared.slot_available.notify_one();

    if let Some(fault) = fault {
        shared.session.fault(fault);
    }
}

/// A status check failed. Per the submission-error symmetry, the handler is treated
/// as gone rather than retried here: if the processor wants a retry it is expected to
/// schedule a fresh handler out of band.
fn fail_handler(shared: &Shared, handler: Box<dyn TaskHandler>, error: &str) {
    let task = handler.task().clone();
    tracing::warn!(task = task.name(), error = %error, "status check failed");

    let fault = task.processor().resume_or_die(error);
    task.processor().count_down();
    shared.session.notify_task_complete(&task, Outcome::Failed);
    shared.slot_available.notify_one();

    if let Some(fault) = fault {
        shared.session.fault(fault);
    }
}

fn should_stop(shared: &Shared) -> bool {
    if shared.session.is_aborted() {
        return true;
    }

    if !shared.session.is_terminated() {
        return false;
    }

    let state = shared.pending.lock().expect(ERR_POISONED_LOCK);
    state.pending.is_empty() && state.running.is_empty()
}

fn sleep_until_next_cycle(shared: &Shared, t0: Instant) {
    let elapsed = t0.elapsed();
    let poll_interval = shared.config.poll_interval();

    if elapsed >= poll_interval {
        return;
    }

    let remaining = poll_interval - elapsed;
    let guard = shared.complete.lock().expect(ERR_POISONED_LOCK);
    let _ = shared
        .task_completed
        .wait_timeout(guard, remaining)
        .expect(ERR_POISONED_LOCK);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use oxidizer_testing::execute_or_abandon;

    use super::*;
    use crate::config::{Capacity, MonitorConfig};
    use crate::handler::test_support::{StubHandler, TestProcessor};
    use crate::monitor::Monitor;
    use crate::session::test_support::TestSession;
    use crate::{BatchHandler, Session, TaskRef};

    fn config() -> MonitorConfig {
        MonitorConfig::new("poller-test", Capacity::limited(4), Duration::from_millis(10))
    }

    /// A batch-aware handler that records, into its shared collector, every handler
    /// name that has registered via `batch()` so far, and snapshots the collector's
    /// size at the moment its own `check_if_completed` runs. If the poller checked
    /// handlers one at a time instead of attaching every sibling first, the first
    /// handler checked would always observe a collector of size 1.
    #[derive(Debug)]
    struct BatchAwareHandler {
        task: TaskRef,
        context: Option<Arc<BatchContext>>,
        registered_siblings_at_check: Arc<Mutex<Option<usize>>>,
    }

    impl BatchAwareHandler {
        fn new(name: &str, registered_siblings_at_check: Arc<Mutex<Option<usize>>>) -> Self {
            Self {
                task: TaskRef::new(name, TestProcessor::new()),
                context: None,
                registered_siblings_at_check,
            }
        }
    }

    impl TaskHandler for BatchAwareHandler {
        fn submit(&mut self) -> Result<(), String> {
            Ok(())
        }

        fn check_if_running(&mut self) -> Result<bool, String> {
            Ok(true)
        }

        fn check_if_completed(&mut self) -> Result<bool, String> {
            let context = self
                .context
                .as_ref()
                .expect("batch() must be called before check_if_completed");
            let registered = context.with(Vec::<String>::new, |names| names.len());
            *self.registered_siblings_at_check.lock().unwrap() = Some(registered);
            Ok(true)
        }

        fn kill(&mut self) -> Result<(), String> {
            Ok(())
        }

        fn task(&self) -> &TaskRef {
            &self.task
        }

        fn as_batch_handler(&mut self) -> Option<&mut dyn BatchHandler> {
            Some(self)
        }
    }

    impl BatchHandler for BatchAwareHandler {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn batch(&mut self, context: Arc<BatchContext>) {
            context.with(Vec::<String>::new, |names| names.push(self.task.name().to_string()));
            self.context = Some(context);
        }
    }

    #[test]
    fn evicts_handler_once_completed() {
        let session = TestSession::new();
        let monitor = Monitor::new(config(), Arc::clone(&session) as Arc<dyn Session>);

        {
            let mut state = monitor.shared().pending.lock().unwrap();
            state.running.push_back(
                TaskHandle::from_raw(1),
                Box::new(StubHandler::new("a").with_completed_after(1)),
            );
        }

        let shared = Arc::clone(monitor.shared());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || run(&thread_shared));
        let _abort_on_unwind = scopeguard::guard(Arc::clone(&session), |s| s.set_aborted());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.running_len(), 0);
        assert!(session
            .events()
            .iter()
            .any(|event| event == "complete:a:Completed"));

        session.set_aborted();
        execute_or_abandon(move || handle.join().unwrap()).expect("poller should exit on abort");
    }

    #[test]
    fn status_check_error_evicts_and_reports_failure() {
        let session = TestSession::new();
        let monitor = Monitor::new(config(), Arc::clone(&session) as Arc<dyn Session>);

        {
            let mut state = monitor.shared().pending.lock().unwrap();
            state.running.push_back(
                TaskHandle::from_raw(1),
                Box::new(StubHandler::new("bad").with_check_completed_error("boom")),
            );
        }

        let shared = Arc::clone(monitor.shared());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || run(&thread_shared));
        let _abort_on_unwind = scopeguard::guard(Arc::clone(&session), |s| s.set_aborted());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(monitor.running_len(), 0);
        assert!(session
            .events()
            .iter()
            .any(|event| event == "complete:bad:Failed"));

        session.set_aborted();
        execute_or_abandon(move || handle.join().unwrap()).expect("poller should exit on abort");
    }

    #[test]
    fn stops_when_terminated_with_empty_queues() {
        let session = TestSession::new();
        let monitor = Monitor::new(config(), Arc::clone(&session) as Arc<dyn Session>);
        session.set_terminated();

        let shared = Arc::clone(monitor.shared());
        execute_or_abandon(move || run(&shared)).expect("poller should exit promptly when already drained");
    }

    #[test]
    fn still_running_handler_is_reinserted_not_dropped() {
        let session = TestSession::new();
        let monitor = Monitor::new(config(), Arc::clone(&session) as Arc<dyn Session>);

        {
            let mut state = monitor.shared().pending.lock().unwrap();
            state.running.push_back(
                TaskHandle::from_raw(1),
                Box::new(StubHandler::new("slow").with_completed_after(1_000_000)),
            );
        }

        let shared = Arc::clone(monitor.shared());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || run(&thread_shared));
        let _abort_on_unwind = scopeguard::guard(Arc::clone(&session), |s| s.set_aborted());

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(monitor.running_len(), 1);

        session.set_aborted();
        execute_or_abandon(move || handle.join().unwrap()).expect("poller should exit on abort");
    }

    #[test]
    fn batch_aware_siblings_share_one_context_populated_before_either_checks() {
        let session = TestSession::new();
        let monitor = Monitor::new(config(), Arc::clone(&session) as Arc<dyn Session>);

        let seen_by_a = Arc::new(Mutex::new(None));
        let seen_by_b = Arc::new(Mutex::new(None));

        {
            let mut state = monitor.shared().pending.lock().unwrap();
            state.running.push_back(
                TaskHandle::from_raw(1),
                Box::new(BatchAwareHandler::new("a", Arc::clone(&seen_by_a))),
            );
            state.running.push_back(
                TaskHandle::from_raw(2),
                Box::new(BatchAwareHandler::new("b", Arc::clone(&seen_by_b))),
            );
        }

        let shared = Arc::clone(monitor.shared());
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || run(&thread_shared));
        let _abort_on_unwind = scopeguard::guard(Arc::clone(&session), |s| s.set_aborted());

        std::thread::sleep(Duration::from_millis(60));

        // Both handlers are the same concrete type, so they share one `BatchContext`
        // for the cycle. If attachment happened one handler at a time interleaved
        // with checks, the first handler checked would see only itself registered.
        assert_eq!(*seen_by_a.lock().unwrap(), Some(2));
        assert_eq!(*seen_by_b.lock().unwrap(), Some(2));

        session.set_aborted();
        execute_or_abandon(move || handle.join().unwrap()).expect("poller should exit on abort");
    }
}
