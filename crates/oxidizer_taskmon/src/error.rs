// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// A specialized `Result` type for task polling monitor operations that return a
/// monitor [`Error`][enum@Error] on failure.
pub type Result<T> = std::result::Result<T, Error>;

/// An error originating in the task polling monitor.
///
/// This is an umbrella type for errors the monitor itself can produce. Errors raised
/// by [`TaskHandler`][crate::TaskHandler] implementations are not wrapped here -- they
/// are routed through the task's [`TaskProcessor`][crate::TaskProcessor] fault policy
/// instead, since a handler failure is a task-level concern, not a monitor-level one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller of some API made a mistake (e.g. called an operation out of
    /// sequence, such as starting a monitor twice).
    #[error("{0}")]
    Programming(String),
}
