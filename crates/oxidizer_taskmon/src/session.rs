// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::{Fault, Outcome, TaskRef};

/// The upward collaborator every [`Monitor`][crate::Monitor] is built against.
///
/// The session owns configuration, the shutdown barrier, and cooperative
/// cancellation; the monitor never reaches for ambient/global state to find it --
/// every monitor is handed an `Arc<dyn Session>` explicitly at construction, per the
/// "session as ambient state" design note.
///
/// Concrete sessions belong to the embedding application; this crate only defines the
/// contract the monitor consumes and a couple of test doubles behind `#[cfg(test)]`.
#[cfg_attr(test, mockall::automock)]
pub trait Session: fmt::Debug + Send + Sync {
    /// Registers the calling monitor with the session's shutdown barrier, so the
    /// session will wait for it before the process considers shutdown complete.
    ///
    /// Must be called before any thread is spawned for the monitor -- registering
    /// after spawning threads risks the session observing a non-registered monitor
    /// and terminating early.
    fn register_with_barrier(&self);

    /// Registers a callback to run when the session begins shutting down. The
    /// monitor uses this to trigger its own cleanup drain.
    fn on_shutdown(&self, callback: Box<dyn FnOnce() + Send>);

    /// `true` once the session has finished normal, successful execution and is
    /// draining outstanding work before exit.
    fn is_terminated(&self) -> bool;

    /// `true` once the session has aborted due to an unrecoverable fault. Both
    /// long-lived monitor threads check this at every iteration boundary and exit
    /// promptly once it flips.
    fn is_aborted(&self) -> bool;

    /// `true` if the session has been cooperatively cancelled (e.g. by the user).
    /// Treated the same as `is_aborted` by the submitter's drain loop.
    fn is_cancelled(&self) -> bool;

    /// Notifies the session that a task has been handed to the backend via
    /// `submit()`.
    fn notify_task_submit(&self, task: &TaskRef);

    /// Notifies the session that a task's handler has observed the edge-triggered
    /// transition to "running".
    fn notify_task_start(&self, task: &TaskRef);

    /// Notifies the session that a task's lifecycle has concluded, however it ended.
    fn notify_task_complete(&self, task: &TaskRef, outcome: Outcome);

    /// Routes an unrecoverable task fault to the session, which aborts it.
    fn fault(&self, fault: Fault);

    /// Emits a diagnostic snapshot of backend network/connectivity status. Purely
    /// observational; called alongside the monitor's own throttled queue dumps.
    fn dump_network_status(&self) {}
}
