// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::BatchContext;
use crate::batch::BatchCleanup;

/// A backend-specific failure that the owning [`TaskProcessor`] has deemed
/// unrecoverable. Once a fault is produced, the monitor hands it to
/// [`Session::fault`][crate::Session::fault], which aborts the session.
#[derive(Debug, Clone)]
pub struct Fault {
    message: String,
}

impl Fault {
    /// Creates a new fault with the given diagnostic message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The diagnostic message describing why the task could not be retried.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// How a task's lifecycle ended, reported to the session via
/// [`Session::notify_task_complete`][crate::Session::notify_task_complete].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler reached a terminal state through normal backend reporting.
    Completed,

    /// The handler's `submit`, `check_if_running`, or `check_if_completed` produced an
    /// error that the task's processor could not resolve into a retry.
    Failed,

    /// The handler was killed during session cleanup before it reached a terminal
    /// state on its own.
    Aborted,
}

/// The policy that decides whether a task-level error is recoverable, and performs
/// any bookkeeping once a task's lifecycle concludes.
///
/// This is the Rust stand-in for the "processor" the source design attaches to each
/// task: it owns the retry/fault policy and the completion latch the task
/// participates in, if any.
pub trait TaskProcessor: fmt::Debug + Send + Sync {
    /// Called whenever a handler operation (`submit`, `check_if_running`,
    /// `check_if_completed`) returns an error. Returning `Some(fault)` marks the task
    /// as unrecoverable; returning `None` means the processor handled the error on its
    /// own (e.g. by scheduling a retry out of band) and the monitor should treat this
    /// particular handler as simply gone.
    fn resume_or_die(&self, error: &str) -> Option<Fault>;

    /// Called once the handler is evicted from the running queue because
    /// `check_if_completed` returned `true`. Returning `Some(fault)` marks completion
    /// as unrecoverable even though the handler itself reported success.
    fn finalize(&self) -> Option<Fault> {
        None
    }

    /// Counts down a completion latch the task participates in, if any. The default
    /// implementation does nothing, for tasks that were not scheduled as part of a
    /// batch a caller is awaiting.
    fn count_down(&self) {}
}

/// A back-reference from a handler to the logical task it executes, carrying the
/// fault-handling policy and diagnostic identity.
#[derive(Debug, Clone)]
pub struct TaskRef {
    name: Arc<str>,
    processor: Arc<dyn TaskProcessor>,
}

impl TaskRef {
    /// Creates a new task reference.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, processor: Arc<dyn TaskProcessor>) -> Self {
        Self {
            name: name.into(),
            processor,
        }
    }

    /// The diagnostic name of the task, used in log lines and dumps.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fault-handling policy owning this task.
    #[must_use]
    pub fn processor(&self) -> &Arc<dyn TaskProcessor> {
        &self.processor
    }
}

/// Lifecycle operations for one unit of work dispatched to a backend.
///
/// Implementations are backend-specific (local process, cluster job scheduler, cloud
/// batch service); the monitor only ever interacts with handlers through this trait.
///
/// # Object safety
///
/// This trait is object-safe and handlers are always stored as `Box<dyn TaskHandler>`,
/// since the monitor manages handlers of heterogeneous concrete types in the same
/// queues.
pub trait TaskHandler: fmt::Debug + Send {
    /// Dispatches the task to the backend.
    ///
    /// On error, the handler must not be inserted into the running queue -- the
    /// monitor enforces this by only promoting handlers whose `submit` returned `Ok`.
    fn submit(&mut self) -> Result<(), String>;

    /// Returns `true` on the edge-triggered transition to "running". Implementations
    /// must be idempotent on repeated calls once they have reported `true` once --
    /// the poller may call this every poll cycle for the lifetime of the handler.
    fn check_if_running(&mut self) -> Result<bool, String>;

    /// Returns `true` once the handler has reached a terminal state (success or
    /// failure). Implementations may consult state populated by a [`BatchContext`]
    /// installed via [`BatchHandler::batch`].
    fn check_if_completed(&mut self) -> Result<bool, String>;

    /// Best-effort termination of the backend task. May itself fail; cleanup logs and
    /// swallows such errors rather than propagating them.
    fn kill(&mut self) -> Result<(), String>;

    /// The logical task this handler executes.
    fn task(&self) -> &TaskRef;

    /// Diagnostic identifier, used in throttled queue dumps.
    fn name(&self) -> &str {
        self.task().name()
    }

    /// Capability query: returns a batch-aware narrowing of this handler, if the
    /// concrete type supports coalesced status probing.
    ///
    /// This is the explicit-capability-query re-expression of the source's runtime
    /// type inspection, per the redesign notes -- avoids a wide inheritance hierarchy
    /// while still letting the poller opt individual handlers into batching.
    fn as_batch_handler(&mut self) -> Option<&mut dyn BatchHandler> {
        None
    }

    /// Capability query: returns a grid-aware narrowing of this handler, if the
    /// concrete type supports coalesced kill during cleanup.
    fn as_grid_handler(&mut self) -> Option<&mut dyn GridHandler> {
        None
    }
}

/// Optional capability for handlers whose status probes can be coalesced with other
/// handlers of the same concrete type into a single backend call.
pub trait BatchHandler {
    /// Identifies the concrete handler type, so the poller can key one
    /// [`BatchContext`] per poll cycle per backend rather than per handler instance.
    fn as_any(&self) -> &dyn Any;

    /// Installs the shared collector to be used during the next `check_if_completed`.
    fn batch(&mut self, context: Arc<BatchContext>);
}

/// Optional capability for handlers whose `kill` calls can be coalesced with other
/// handlers of the same concrete type during session cleanup.
pub trait GridHandler {
    /// Identifies the concrete handler type, so cleanup can key one [`BatchCleanup`]
    /// per concrete backend rather than per handler instance.
    fn as_any(&self) -> &dyn Any;

    /// Installs the shared aggregator to be used for the pending `kill` call.
    fn attach_cleanup(&mut self, cleanup: Arc<BatchCleanup>);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_message_round_trips() {
        let fault = Fault::new("backend unreachable");
        assert_eq!(fault.message(), "backend unreachable");
        assert_eq!(fault.to_string(), "backend unreachable");
    }

    #[derive(Debug)]
    struct NeverFaults;

    impl TaskProcessor for NeverFaults {
        fn resume_or_die(&self, _error: &str) -> Option<Fault> {
            None
        }
    }

    #[test]
    fn task_processor_default_finalize_and_count_down_are_no_ops() {
        let processor = NeverFaults;
        assert!(processor.finalize().is_none());
        processor.count_down();
    }

    #[test]
    fn task_ref_exposes_name_and_processor() {
        let task = TaskRef::new("demo", Arc::new(NeverFaults));
        assert_eq!(task.name(), "demo");
        assert!(task.processor().resume_or_die("boom").is_none());
    }
}
