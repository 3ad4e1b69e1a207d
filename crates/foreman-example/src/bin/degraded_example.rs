// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Degraded Example - Demonstrates failure policy when the server is away.
//!
//! This example shows:
//! - A transport whose connections always fail
//! - Bounded retry with backoff in the connection registry
//! - Degraded mode: the worker is registered but carries no live worker
//! - Recovery via clear_attempts once the server "comes back"
//!
//! Run with: cargo run -p foreman-example --bin degraded_example

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use foreman_sdk::{
    ClientHandle, ConnectionConfig, Transport, TransportError, WorkerConnection, WorkerDefinition,
    WorkerHandle, WorkerManager, WorkerSpawnSpec,
};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug)]
struct InMemoryConnection;

#[async_trait]
impl ClientHandle for InMemoryConnection {
    async fn check_health(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[async_trait]
impl WorkerConnection for InMemoryConnection {
    async fn check_health(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct InMemoryWorker {
    stop: Notify,
}

#[async_trait]
impl WorkerHandle for InMemoryWorker {
    async fn run(&self) -> Result<(), TransportError> {
        self.stop.notified().await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.stop.notify_one();
        Ok(())
    }
}

/// Transport that refuses connections until `heal` is called, simulating a
/// server that is down at startup and comes back later.
struct FlakyTransport {
    down: AtomicBool,
}

impl FlakyTransport {
    fn new() -> Self {
        Self {
            down: AtomicBool::new(true),
        }
    }

    fn heal(&self) {
        self.down.store(false, Ordering::SeqCst);
    }

    fn refuse(&self) -> Result<(), TransportError> {
        if self.down.load(Ordering::SeqCst) {
            Err(TransportError::Connect("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn open_client(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClientHandle>, TransportError> {
        self.refuse()?;
        Ok(Arc::new(InMemoryConnection))
    }

    async fn open_worker_connection(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Arc<dyn WorkerConnection>, TransportError> {
        self.refuse()?;
        Ok(Arc::new(InMemoryConnection))
    }

    async fn create_worker(
        &self,
        _connection: Arc<dyn WorkerConnection>,
        _spec: &WorkerSpawnSpec,
    ) -> Result<Arc<dyn WorkerHandle>, TransportError> {
        Ok(Arc::new(InMemoryWorker { stop: Notify::new() }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Degraded Example: Surviving an Unreachable Server ===");

    let transport = Arc::new(FlakyTransport::new());
    let manager = WorkerManager::new(transport.clone());
    manager.activities().mark_ready();

    // allow_connection_failure is the default: exhausted retries degrade the
    // worker instead of failing registration. The short backoff keeps the
    // example snappy.
    let connection = ConnectionConfig::localhost().with_retry_backoff_ms(100);
    let definition = WorkerDefinition::new("orders")
        .with_workflows_path("./workflows")
        .with_connection(connection.clone())
        .with_auto_start(false);

    info!("Registering worker while the server is down...");
    manager.register_worker(definition).await?;

    let status = manager
        .get_worker_status("orders")
        .await
        .expect("worker is registered");
    warn!(
        state = %status.state,
        last_error = ?status.last_error,
        "Worker is degraded: registered, but without a live worker"
    );

    // Starting a degraded worker is rejected; the application keeps running.
    if let Err(e) = manager.start_worker("orders").await {
        warn!("Start rejected while degraded: {e}");
    }

    // The server comes back. The retry budget is exhausted, so reset it
    // before restarting the worker.
    info!("Server is back; clearing attempt counter and restarting...");
    transport.heal();
    manager.connection_registry().clear_attempts(&connection).await;
    manager.restart_worker("orders").await?;

    let status = manager
        .get_worker_status("orders")
        .await
        .expect("worker is registered");
    info!(state = %status.state, "Worker recovered");

    manager.start_worker("orders").await?;
    info!("Worker started; shutting down");
    manager.shutdown().await;

    info!("=== Degraded example completed ===");
    Ok(())
}
