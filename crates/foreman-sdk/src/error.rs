// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use thiserror::Error;

/// Errors that can occur in the SDK.
///
/// Shutdown-path failures never appear here: teardown errors are logged and
/// swallowed so that process teardown always completes.
#[derive(Debug, Error)]
pub enum ForemanError {
    /// Invalid worker or connection configuration. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection creation exhausted its retry budget.
    #[error("failed to connect to {address} after {attempts} attempts")]
    Connection {
        /// Address of the orchestration server
        address: String,
        /// Number of creation attempts made for this endpoint
        attempts: u32,
    },

    /// Worker initialization failed and the definition does not tolerate it.
    #[error("worker '{task_queue}' failed to initialize: {reason}")]
    WorkerInitialization {
        /// Task queue of the failed worker
        task_queue: String,
        /// Human-readable cause
        reason: String,
    },

    /// The worker's poll loop exited with an error after a successful start.
    #[error("worker '{task_queue}' poll loop failed: {message}")]
    WorkerRuntime {
        /// Task queue of the failed worker
        task_queue: String,
        /// Error reported by the poll loop
        message: String,
    },

    /// Start was requested for a worker that was never initialized.
    #[error("worker for task queue '{0}' was never initialized")]
    WorkerNotInitialized(String),

    /// A worker is already registered for this task queue.
    #[error("task queue '{0}' is already registered")]
    DuplicateTaskQueue(String),

    /// No worker is registered for this task queue.
    #[error("no worker registered for task queue '{0}'")]
    UnknownTaskQueue(String),
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, ForemanError>;
