// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A bounded-concurrency task polling monitor.
//!
//! This crate sits between a workflow engine that produces logical task descriptions
//! and the backends (local process, cluster scheduler, cloud batch service) that
//! execute them. It accepts an open-ended stream of [`TaskHandler`]s via
//! [`Monitor::schedule`], throttles how many run concurrently against a configured
//! [`Capacity`], drives each in-flight handler to completion by periodic polling, and
//! tears everything down deterministically on session shutdown.
//!
//! The coordination itself -- two queues, two condition variable pairs, a submitter
//! thread and a poller thread -- is owned by [`Monitor`]; backend integration happens
//! entirely through the [`TaskHandler`], [`BatchHandler`], and [`GridHandler`] traits.

// Public API surface.
mod batch;
mod config;
mod error;
mod handler;
mod latch;
mod monitor;
mod queues;
mod session;

pub use batch::{BatchCleanup, BatchContext};
pub use config::{CanSubmit, Capacity, MonitorConfig, DEFAULT_DUMP_INTERVAL};
pub use error::{Error, Result};
pub use handler::{BatchHandler, Fault, GridHandler, Outcome, TaskHandler, TaskProcessor, TaskRef};
pub use latch::CompletionLatch;
pub use monitor::Monitor;
pub use queues::{PendingQueue, RunningQueue, TaskHandle};
pub use session::Session;

// Internal to the crate but re-exported at crate root for reduced hassle.
mod constants;
mod diagnostics;
mod poller;
mod submitter;

pub(crate) use constants::ERR_POISONED_LOCK;
