// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Foreman SDK - Connection caching and worker lifecycle management.
//!
//! This crate manages the long-running side of talking to a workflow
//! orchestration server: it creates, caches, health-checks and retries
//! client/worker connections, and drives the lifecycle of the workers
//! that poll the server for work - initialization, activity binding,
//! start, and graceful shutdown, including the "continue in degraded
//! mode vs. fail fast" policy.
//!
//! # Features
//!
//! - **Connection caching**: one live connection per endpoint identity
//!   (address + namespace + auth presence), health-checked on every
//!   lookup and replaced when unhealthy
//! - **Bounded retries**: creation failures back off and retry up to a
//!   bound, then degrade or fail fast per policy
//! - **Worker lifecycle**: initialize, auto-start (optionally delayed),
//!   explicit start, restart, and idempotent shutdown per task queue
//! - **Activity binding**: explicit name-to-handler registration with
//!   bounded readiness polling for early-initializing workers
//! - **Observability**: structured `tracing` throughout, plus status and
//!   connection-health snapshots for the host application
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use foreman_sdk::{ConnectionConfig, WorkerDefinition, WorkerManager};
//!
//! #[tokio::main]
//! async fn main() -> foreman_sdk::Result<()> {
//!     // A transport implements the connection-opening primitives; the
//!     // manager owns caching, retries and worker state on top of it.
//!     let manager = WorkerManager::new(transport);
//!
//!     manager.activities().register("charge-card", handler).await;
//!     manager.activities().mark_ready();
//!
//!     manager
//!         .register_worker(
//!             WorkerDefinition::new("orders")
//!                 .with_workflows_path("./workflows")
//!                 .with_connection(ConnectionConfig::localhost()),
//!         )
//!         .await?;
//!
//!     // ... the worker polls until shutdown
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Failure policy
//!
//! | Failure point | Policy |
//! |---|---|
//! | Configuration validation | Fatal, always - raised before any transport call |
//! | Connection retries exhausted | Degraded if tolerated, else fatal |
//! | Poll loop fails after start | Surfaced to the caller, `is_running` reset, no auto-restart |
//! | Any shutdown-path error | Logged and swallowed - teardown always completes |
//!
//! # Configuration
//!
//! Connection configs are built programmatically or from `FOREMAN_*`
//! environment variables; see [`ConnectionConfig::from_env`]. The worker
//! concurrency profile defaults per environment tier (`FOREMAN_ENV`) and
//! is overridable field-wise per definition.

mod activities;
mod config;
mod error;
mod keying;
mod lifecycle;
mod manager;
mod registry;
mod transport;
mod types;

// Main types
pub use activities::{ActivityError, ActivityHandler, ActivityRegistry};
pub use config::{
    ConnectionConfig, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_NAMESPACE, DEFAULT_RETRY_BACKOFF_MS,
    EnvironmentTier, ProxyOptions, TlsOptions, WorkerDefinition, WorkerTuning,
    WorkerTuningOverrides,
};
pub use error::{ForemanError, Result};
pub use keying::connection_key;
pub use lifecycle::WorkerController;
pub use manager::WorkerManager;
pub use registry::ConnectionRegistry;
pub use transport::{
    ClientHandle, Transport, TransportError, WorkerConnection, WorkerHandle, WorkerSpawnSpec,
};
pub use types::{
    ConnectionHealth, WorkerState, WorkerStatus, WorkflowSource, WorkflowSourceKind,
};
