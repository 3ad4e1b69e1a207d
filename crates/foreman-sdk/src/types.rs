// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! High-level types for the SDK.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a worker's workflow definitions come from.
#[derive(Clone, PartialEq, Eq)]
pub enum WorkflowSource {
    /// Filesystem path to workflow definitions
    Filesystem(String),
    /// Pre-built workflow bundle
    Bundle(Vec<u8>),
}

impl WorkflowSource {
    /// The kind of this source.
    pub fn kind(&self) -> WorkflowSourceKind {
        match self {
            WorkflowSource::Filesystem(_) => WorkflowSourceKind::Filesystem,
            WorkflowSource::Bundle(_) => WorkflowSourceKind::Bundle,
        }
    }
}

impl fmt::Debug for WorkflowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowSource::Filesystem(path) => write!(f, "Filesystem({path})"),
            WorkflowSource::Bundle(bytes) => write!(f, "Bundle({} bytes)", bytes.len()),
        }
    }
}

/// Workflow source kind as reported in worker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowSourceKind {
    /// Definitions loaded from the filesystem
    Filesystem,
    /// Definitions from a pre-built bundle
    Bundle,
    /// No source bound (uninitialized or shut down)
    #[default]
    None,
}

/// Lifecycle state of a worker controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No initialization attempted yet
    Uninitialized,
    /// Initialization in progress
    Initializing,
    /// Initialized and waiting to start
    Ready,
    /// Initialization failed but the failure is tolerated; the
    /// application keeps running without this worker
    Degraded,
    /// Poll loop is running
    Running,
    /// Shutdown in progress
    ShuttingDown,
    /// Shut down; all record fields released
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Initializing => "initializing",
            WorkerState::Ready => "ready",
            WorkerState::Degraded => "degraded",
            WorkerState::Running => "running",
            WorkerState::ShuttingDown => "shutting_down",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Point-in-time worker status as reported to the host application.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    /// Lifecycle state
    pub state: WorkerState,
    /// Whether initialization completed successfully
    pub is_initialized: bool,
    /// Whether the poll loop is currently running
    pub is_running: bool,
    /// Last recorded error, if any
    pub last_error: Option<String>,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// Uptime of the current run in milliseconds, computed at query time
    pub uptime_ms: Option<u64>,
    /// Number of activities bound to the worker
    pub activities_count: usize,
    /// Kind of workflow source the worker was built with
    pub workflow_source: WorkflowSourceKind,
}

/// Connection registry health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionHealth {
    /// Cached client connections
    pub client_connections: usize,
    /// Cached worker transport connections
    pub worker_connections: usize,
    /// Sum of pending creation-attempt counters across endpoints
    pub total_pending_attempts: u32,
}
