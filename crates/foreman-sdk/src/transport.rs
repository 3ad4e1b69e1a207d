// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport primitives consumed by the connection registry.
//!
//! The SDK is a client of an external orchestration protocol, not an
//! implementer of one. These traits are the seam where a real transport
//! (or an in-process fake in tests) plugs in: opening client and worker
//! connections, and constructing a worker bound to a task queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::activities::ActivityHandler;
use crate::config::{ConnectionConfig, WorkerTuning};
use crate::types::WorkflowSource;

/// Errors surfaced by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening a connection failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// The handle was used after being closed
    #[error("handle is closed")]
    Closed,

    /// Worker construction failed
    #[error("worker creation failed: {0}")]
    WorkerCreation(String),

    /// The worker poll loop exited with an error
    #[error("poll loop failed: {0}")]
    PollLoop(String),

    /// Closing a handle failed
    #[error("close failed: {0}")]
    Close(String),
}

/// A live client connection used for starting and signalling workflows.
#[async_trait]
pub trait ClientHandle: Send + Sync + std::fmt::Debug {
    /// Probe whether the client can still issue workflow operations.
    ///
    /// The registry re-evaluates this on every cache lookup; any error is
    /// treated as "unhealthy", never propagated.
    async fn check_health(&self) -> std::result::Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&self) -> std::result::Result<(), TransportError>;
}

/// A live transport connection a worker polls the server over.
#[async_trait]
pub trait WorkerConnection: Send + Sync {
    /// Probe whether the connection is still usable (i.e. not closed).
    async fn check_health(&self) -> std::result::Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&self) -> std::result::Result<(), TransportError>;
}

/// A constructed worker bound to a task queue.
#[async_trait]
pub trait WorkerHandle: Send + Sync {
    /// Run the blocking poll loop.
    ///
    /// Suspends for the remaining life of the process. Returns `Ok(())`
    /// after a graceful [`WorkerHandle::shutdown`], or an error if the
    /// loop fails.
    async fn run(&self) -> std::result::Result<(), TransportError>;

    /// Request a graceful stop, causing `run` to return `Ok(())`.
    async fn shutdown(&self) -> std::result::Result<(), TransportError>;
}

/// Everything needed to construct a worker for one task queue.
#[derive(Clone)]
pub struct WorkerSpawnSpec {
    /// Logical namespace the worker operates in
    pub namespace: String,
    /// Task queue the worker polls
    pub task_queue: String,
    /// Where workflow definitions come from
    pub workflow_source: WorkflowSource,
    /// Bound activity handlers by name
    pub activities: HashMap<String, Arc<dyn ActivityHandler>>,
    /// Merged concurrency/shutdown tuning
    pub tuning: WorkerTuning,
}

impl fmt::Debug for WorkerSpawnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.activities.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("WorkerSpawnSpec")
            .field("namespace", &self.namespace)
            .field("task_queue", &self.task_queue)
            .field("workflow_source", &self.workflow_source)
            .field("activities", &names)
            .field("tuning", &self.tuning)
            .finish()
    }
}

/// Transport factory wrapped by the connection registry.
///
/// Implementations may fail on any method; the registry owns retry,
/// backoff and caching policy on top of these primitives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a client connection for workflow operations.
    async fn open_client(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<Arc<dyn ClientHandle>, TransportError>;

    /// Open a transport connection for a worker to poll over.
    async fn open_worker_connection(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<Arc<dyn WorkerConnection>, TransportError>;

    /// Construct a worker on top of an open connection.
    async fn create_worker(
        &self,
        connection: Arc<dyn WorkerConnection>,
        spec: &WorkerSpawnSpec,
    ) -> std::result::Result<Arc<dyn WorkerHandle>, TransportError>;
}
