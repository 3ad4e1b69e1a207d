// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host-facing worker manager.
//!
//! The manager is the surface a host application wires into its
//! lifecycle hooks: register workers after bootstrap, start them
//! (automatically or explicitly), query status, and shut everything down
//! at process teardown. It owns the connection registry and the activity
//! registry, and one controller per task queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::activities::ActivityRegistry;
use crate::config::WorkerDefinition;
use crate::error::{ForemanError, Result};
use crate::lifecycle::{StartOutcome, WorkerController};
use crate::registry::ConnectionRegistry;
use crate::transport::Transport;
use crate::types::{ConnectionHealth, WorkerStatus};

/// Process-wide manager for worker lifecycles and shared connections.
///
/// Explicitly constructed and passed around; there is no hidden
/// process-wide instance.
pub struct WorkerManager {
    transport: Arc<dyn Transport>,
    registry: Arc<ConnectionRegistry>,
    activities: Arc<ActivityRegistry>,
    controllers: Mutex<HashMap<String, Arc<WorkerController>>>,
}

impl WorkerManager {
    /// Create a manager wrapping the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(transport.clone())),
            activities: Arc::new(ActivityRegistry::new()),
            transport,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager sharing an externally built activity registry.
    pub fn with_activities(
        transport: Arc<dyn Transport>,
        activities: Arc<ActivityRegistry>,
    ) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(transport.clone())),
            activities,
            transport,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// The activity registry workers bind against.
    pub fn activities(&self) -> &Arc<ActivityRegistry> {
        &self.activities
    }

    /// The shared connection registry.
    pub fn connection_registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register and initialize a worker for a task queue.
    ///
    /// At most one worker per task queue; a second registration for the
    /// same queue is rejected, never silently overwritten. When the
    /// definition has `auto_start` set, a start task is spawned after the
    /// configured delay. A fatally failed initialization leaves no
    /// registration behind, so a corrected definition can be submitted
    /// again.
    #[instrument(skip(self, definition), fields(task_queue = %definition.task_queue))]
    pub async fn register_worker(&self, definition: WorkerDefinition) -> Result<()> {
        definition.validate()?;
        let task_queue = definition.task_queue.clone();

        let controller = {
            let mut controllers = self.controllers.lock().await;
            if controllers.contains_key(&task_queue) {
                return Err(ForemanError::DuplicateTaskQueue(task_queue));
            }
            let controller = Arc::new(WorkerController::new(
                definition.clone(),
                self.transport.clone(),
                self.registry.clone(),
                self.activities.clone(),
            ));
            controllers.insert(task_queue.clone(), controller.clone());
            controller
        };

        if let Err(e) = controller.initialize().await {
            self.controllers.lock().await.remove(&task_queue);
            return Err(e);
        }

        if definition.auto_start {
            self.spawn_auto_start(controller, definition.start_delay_ms)
                .await;
        }
        info!("worker registered");
        Ok(())
    }

    /// Explicitly start a registered worker (for `auto_start = false`
    /// definitions, or after a manual stop).
    ///
    /// Fails fast when the queue is unknown or the worker was never
    /// initialized. On success the worker is observably running when this
    /// returns; the poll loop itself is awaited on a spawned task and a
    /// poll-loop failure is logged and recorded in the worker status.
    pub async fn start_worker(&self, task_queue: &str) -> Result<()> {
        let controller = self.controller(task_queue).await?;
        match controller.begin_start().await? {
            StartOutcome::Skipped => Ok(()),
            StartOutcome::Started(worker) => {
                let task_queue = task_queue.to_string();
                tokio::spawn(async move {
                    if let Err(e) = controller.finish_run(worker).await {
                        error!(task_queue = %task_queue, error = %e, "worker exited with error");
                    }
                });
                Ok(())
            }
        }
    }

    /// Shut down every worker, then close all cached connections.
    ///
    /// Idempotent and infallible. Controllers stay registered with
    /// released records so status stays queryable after teardown.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let controllers: Vec<Arc<WorkerController>> =
            self.controllers.lock().await.values().cloned().collect();
        for controller in controllers {
            controller.shutdown().await;
        }
        self.registry.close_all().await;
        info!("worker manager shut down");
    }

    /// Restart a worker for a configuration reload: shutdown, fresh
    /// initialization, and a new auto-start timer when the definition
    /// asks for one. In-flight work is not preserved.
    pub async fn restart_worker(&self, task_queue: &str) -> Result<()> {
        let controller = self.controller(task_queue).await?;
        controller.restart().await?;
        let definition = controller.definition();
        if definition.auto_start {
            let delay_ms = definition.start_delay_ms;
            self.spawn_auto_start(controller, delay_ms).await;
        }
        Ok(())
    }

    /// Status of the worker bound to a task queue, if one is registered.
    pub async fn get_worker_status(&self, task_queue: &str) -> Option<WorkerStatus> {
        let controller = self.controllers.lock().await.get(task_queue).cloned()?;
        Some(controller.status().await)
    }

    /// Health snapshot of the shared connection registry.
    pub async fn get_connection_health(&self) -> ConnectionHealth {
        self.registry.health().await
    }

    /// Registered task queues.
    pub async fn task_queues(&self) -> Vec<String> {
        self.controllers.lock().await.keys().cloned().collect()
    }

    async fn controller(&self, task_queue: &str) -> Result<Arc<WorkerController>> {
        self.controllers
            .lock()
            .await
            .get(task_queue)
            .cloned()
            .ok_or_else(|| ForemanError::UnknownTaskQueue(task_queue.to_string()))
    }

    /// Spawn the delayed auto-start task, guarded by the controller's
    /// cancellation token so shutdown can drop a pending timer.
    async fn spawn_auto_start(&self, controller: Arc<WorkerController>, delay_ms: u64) {
        let token = controller.arm_auto_start().await;
        tokio::spawn(async move {
            if delay_ms > 0 {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        debug!(
                            task_queue = %controller.task_queue(),
                            "auto-start cancelled before the delay elapsed"
                        );
                        return;
                    }

                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            if token.is_cancelled() {
                return;
            }
            match controller.start().await {
                Ok(()) => {}
                Err(ForemanError::WorkerNotInitialized(task_queue)) => {
                    warn!(task_queue = %task_queue, "auto-start skipped, worker is not initialized");
                }
                Err(e) => {
                    error!(
                        task_queue = %controller.task_queue(),
                        error = %e,
                        "worker exited with error"
                    );
                }
            }
        });
    }
}
