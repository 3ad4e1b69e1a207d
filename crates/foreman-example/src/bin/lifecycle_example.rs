// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lifecycle Example - Demonstrates the full foreman-sdk worker lifecycle.
//!
//! This example shows:
//! - Activity registration and readiness signalling
//! - Registering a worker definition with the manager
//! - Starting the worker and observing its status
//! - Graceful shutdown
//!
//! An in-memory transport stands in for a real orchestration server so the
//! example runs without any external process.
//!
//! Run with: cargo run -p foreman-example --bin lifecycle_example

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foreman_sdk::{
    ActivityError, ActivityHandler, ClientHandle, ConnectionConfig, Transport, TransportError,
    WorkerConnection, WorkerDefinition, WorkerHandle, WorkerManager, WorkerSpawnSpec,
};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::info;

/// Connection handle backed by nothing at all. Always healthy.
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

/// Worker whose poll loop parks until a graceful shutdown arrives.
struct InMemoryWorker {
    task_queue: String,
    activities: HashMap<String, Arc<dyn ActivityHandler>>,
    stop: Notify,
}

#[async_trait]
impl WorkerHandle for InMemoryWorker {
    async fn run(&self) -> Result<(), TransportError> {
        info!(task_queue = %self.task_queue, "worker poll loop started");

        // Exercise the bound activities once so the example produces output,
        // then park until shutdown like a real poll loop would.
        for (name, handler) in &self.activities {
            match handler.call(json!({"task_queue": self.task_queue})).await {
                Ok(output) => info!(activity = %name, %output, "activity invoked"),
                Err(e) => info!(activity = %name, error = %e, "activity failed"),
            }
        }

        self.stop.notified().await;
        info!(task_queue = %self.task_queue, "worker poll loop exiting");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.stop.notify_one();
        Ok(())
    }
}

struct InMemoryTransport;

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open_client(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClientHandle>, TransportError> {
        info!(address = ?config.server_addr, "opening client connection");
        Ok(Arc::new(InMemoryConnection))
    }

    async fn open_worker_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn WorkerConnection>, TransportError> {
        info!(address = ?config.server_addr, "opening worker connection");
        Ok(Arc::new(InMemoryConnection))
    }

    async fn create_worker(
        &self,
        _connection: Arc<dyn WorkerConnection>,
        spec: &WorkerSpawnSpec,
    ) -> Result<Arc<dyn WorkerHandle>, TransportError> {
        info!(task_queue = %spec.task_queue, tuning = ?spec.tuning, "creating worker");
        Ok(Arc::new(InMemoryWorker {
            task_queue: spec.task_queue.clone(),
            activities: spec.activities.clone(),
            stop: Notify::new(),
        }))
    }
}

/// Toy activity that wraps its input in a greeting envelope.
struct Greet;

#[async_trait]
impl ActivityHandler for Greet {
    async fn call(&self, input: Value) -> Result<Value, ActivityError> {
        Ok(json!({"greeting": "hello", "input": input}))
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

    info!("=== Lifecycle Example: Foreman Worker Manager ===");

    let manager = WorkerManager::new(Arc::new(InMemoryTransport));

    // Activities must be registered and marked ready before worker
    // initialization will bind them.
    manager.activities().register("greet", Arc::new(Greet)).await;
    manager.activities().mark_ready();
    info!("Registered activities and marked registry ready");

    // In production, use ConnectionConfig::from_env() to pick up FOREMAN_*
    // environment variables instead of hardcoding localhost.
    let definition = WorkerDefinition::new("orders")
        .with_workflows_path("./workflows")
        .with_connection(ConnectionConfig::localhost())
        .with_auto_start(false);

    info!("Registering worker for task queue 'orders'...");
    manager.register_worker(definition).await?;

    let status = manager
        .get_worker_status("orders")
        .await
        .expect("worker was just registered");
    info!(
        state = %status.state,
        activities = status.activities_count,
        "Worker initialized"
    );

    info!("Starting worker...");
    manager.start_worker("orders").await?;

    // Give the poll loop a moment to run, then inspect status.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let status = manager
        .get_worker_status("orders")
        .await
        .expect("worker is registered");
    info!(
        state = %status.state,
        is_running = status.is_running,
        uptime_ms = ?status.uptime_ms,
        "Worker running"
    );

    let health = manager.get_connection_health().await;
    info!(
        worker_connections = health.worker_connections,
        client_connections = health.client_connections,
        "Connection health"
    );

    info!("Shutting down...");
    manager.shutdown().await;

    let status = manager
        .get_worker_status("orders")
        .await
        .expect("status remains queryable after shutdown");
    info!(state = %status.state, "Worker stopped");

    info!("=== Lifecycle example completed ===");
    Ok(())
}
