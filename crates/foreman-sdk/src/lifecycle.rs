// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker lifecycle controller: initialization, activity binding, start
//! and graceful shutdown for a single task queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::activities::ActivityRegistry;
use crate::config::{EnvironmentTier, WorkerDefinition};
use crate::error::{ForemanError, Result};
use crate::registry::ConnectionRegistry;
use crate::transport::{Transport, WorkerConnection, WorkerHandle, WorkerSpawnSpec};
use crate::types::{WorkerState, WorkerStatus, WorkflowSourceKind};

/// Readiness polls against the activity registry before binding whatever
/// is registered.
const ACTIVITY_DISCOVERY_MAX_ATTEMPTS: u32 = 5;
const ACTIVITY_DISCOVERY_DELAY_MS: u64 = 200;

/// Per-task-queue worker record. All fields are released on shutdown.
#[derive(Default)]
struct WorkerRecord {
    worker: Option<Arc<dyn WorkerHandle>>,
    connection: Option<Arc<dyn WorkerConnection>>,
    is_initialized: bool,
    is_running: bool,
    started_at: Option<chrono::DateTime<Utc>>,
    last_error: Option<String>,
    activity_names: Vec<String>,
    workflow_source: WorkflowSourceKind,
}

struct ControllerState {
    phase: WorkerState,
    /// Set at the beginning of shutdown so a concurrently-resolving start
    /// cannot flip `is_running` back on while resources are being
    /// released. Checked under the same lock that mutates `is_running`.
    stopping: bool,
    record: WorkerRecord,
}

/// Outcome of the synchronous half of a start request.
pub(crate) enum StartOutcome {
    /// Nothing to do: already running, or shutdown is in progress
    Skipped,
    /// State flipped to running; the caller owns awaiting the poll loop
    Started(Arc<dyn WorkerHandle>),
}

/// Owns the worker state machine for one task queue:
/// `Uninitialized → Initializing → {Ready | Degraded} → Running →
/// ShuttingDown → Stopped`.
///
/// The controller borrows connections from the [`ConnectionRegistry`]
/// and never opens raw connections itself.
pub struct WorkerController {
    definition: WorkerDefinition,
    transport: Arc<dyn Transport>,
    registry: Arc<ConnectionRegistry>,
    activities: Arc<ActivityRegistry>,
    state: Mutex<ControllerState>,
    auto_start: Mutex<CancellationToken>,
}

impl WorkerController {
    /// Create a controller for the given definition.
    pub fn new(
        definition: WorkerDefinition,
        transport: Arc<dyn Transport>,
        registry: Arc<ConnectionRegistry>,
        activities: Arc<ActivityRegistry>,
    ) -> Self {
        Self {
            definition,
            transport,
            registry,
            activities,
            state: Mutex::new(ControllerState {
                phase: WorkerState::Uninitialized,
                stopping: false,
                record: WorkerRecord::default(),
            }),
            auto_start: Mutex::new(CancellationToken::new()),
        }
    }

    /// Task queue this controller is bound to.
    pub fn task_queue(&self) -> &str {
        &self.definition.task_queue
    }

    /// Definition this controller was built from.
    pub fn definition(&self) -> &WorkerDefinition {
        &self.definition
    }

    /// Validate configuration, bind activities, obtain a connection and
    /// construct the worker.
    ///
    /// Configuration errors are always fatal and raised before any
    /// transport call. Connection and worker-creation failures move the
    /// controller to the degraded state when `allow_worker_failure` is
    /// set, and are fatal otherwise. Safe no-op when already initialized.
    #[instrument(skip(self), fields(task_queue = %self.definition.task_queue))]
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.record.is_initialized {
                debug!("worker already initialized");
                return Ok(());
            }
            state.phase = WorkerState::Initializing;
        }

        let source = match self.definition.validate() {
            Ok(source) => source,
            Err(e) => {
                self.state.lock().await.phase = WorkerState::Uninitialized;
                return Err(e);
            }
        };

        self.activities
            .wait_ready(
                ACTIVITY_DISCOVERY_MAX_ATTEMPTS,
                Duration::from_millis(ACTIVITY_DISCOVERY_DELAY_MS),
            )
            .await;
        let handlers = self.activities.discover().await;

        let connection = match self
            .registry
            .get_or_create_worker_connection(&self.definition.connection)
            .await
        {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                let reason = format!(
                    "no connection available for {}",
                    self.definition
                        .connection
                        .server_addr
                        .as_deref()
                        .unwrap_or("<unconfigured>")
                );
                return self.fail_initialization(reason).await;
            }
            Err(e) => {
                if self.definition.allow_worker_failure {
                    return self.enter_degraded(e.to_string()).await;
                }
                self.state.lock().await.phase = WorkerState::Uninitialized;
                return Err(e);
            }
        };

        let tier = EnvironmentTier::detect();
        let spec = WorkerSpawnSpec {
            namespace: self.definition.connection.namespace_or_default().to_string(),
            task_queue: self.definition.task_queue.clone(),
            workflow_source: source.clone(),
            activities: handlers,
            tuning: self.definition.resolved_tuning(tier),
        };

        let worker = match self.transport.create_worker(connection.clone(), &spec).await {
            Ok(worker) => worker,
            Err(e) => {
                let reason = format!("worker creation failed: {e}");
                return self.fail_initialization(reason).await;
            }
        };

        let activity_names: Vec<String> = spec.activities.keys().cloned().collect();
        let mut state = self.state.lock().await;
        state.record.worker = Some(worker);
        state.record.connection = Some(connection);
        state.record.is_initialized = true;
        state.record.last_error = None;
        state.record.activity_names = activity_names;
        state.record.workflow_source = source.kind();
        state.phase = WorkerState::Ready;
        info!(
            tier = ?tier,
            activities = state.record.activity_names.len(),
            "worker initialized"
        );
        Ok(())
    }

    /// Run the worker's poll loop, suspending until it exits.
    ///
    /// No-op when already running or when a shutdown is in progress.
    /// Returns [`ForemanError::WorkerNotInitialized`] when the worker was
    /// never initialized (including degraded controllers). A poll-loop
    /// error resets `is_running` and is surfaced to the caller; there is
    /// no automatic restart.
    pub async fn start(&self) -> Result<()> {
        match self.begin_start().await? {
            StartOutcome::Skipped => Ok(()),
            StartOutcome::Started(worker) => self.finish_run(worker).await,
        }
    }

    /// Synchronous half of a start: flips `is_running` under the state
    /// lock so the caller can observe the worker as running before the
    /// poll loop is awaited.
    pub(crate) async fn begin_start(&self) -> Result<StartOutcome> {
        let mut state = self.state.lock().await;
        if state.record.is_running {
            debug!(task_queue = %self.definition.task_queue, "worker already running");
            return Ok(StartOutcome::Skipped);
        }
        if state.stopping || state.phase == WorkerState::ShuttingDown {
            debug!(task_queue = %self.definition.task_queue, "start skipped, shutdown in progress");
            return Ok(StartOutcome::Skipped);
        }
        if !state.record.is_initialized {
            return Err(ForemanError::WorkerNotInitialized(
                self.definition.task_queue.clone(),
            ));
        }
        let worker = state
            .record
            .worker
            .clone()
            .ok_or_else(|| ForemanError::WorkerNotInitialized(self.definition.task_queue.clone()))?;
        state.record.is_running = true;
        state.record.started_at = Some(Utc::now());
        state.phase = WorkerState::Running;
        info!(task_queue = %self.definition.task_queue, "worker started, entering poll loop");
        Ok(StartOutcome::Started(worker))
    }

    /// Await the poll loop and record its outcome.
    pub(crate) async fn finish_run(&self, worker: Arc<dyn WorkerHandle>) -> Result<()> {
        let run_result = worker.run().await;

        let mut state = self.state.lock().await;
        // A restart may have replaced the record while the old poll loop
        // was draining; only the current incarnation may touch the state.
        let current = state
            .record
            .worker
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(w, &worker));
        if current {
            state.record.is_running = false;
            if !state.stopping && state.record.is_initialized {
                state.phase = WorkerState::Ready;
            }
        }
        match run_result {
            Ok(()) => {
                info!(task_queue = %self.definition.task_queue, "worker poll loop exited cleanly");
                Ok(())
            }
            Err(e) => {
                if current {
                    state.record.last_error = Some(e.to_string());
                }
                error!(
                    task_queue = %self.definition.task_queue,
                    error = %e,
                    "worker poll loop failed"
                );
                Err(ForemanError::WorkerRuntime {
                    task_queue: self.definition.task_queue.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Stop the worker and release its resources.
    ///
    /// Idempotent and infallible: every error on this path is logged and
    /// swallowed so teardown always completes. Cancels any pending
    /// auto-start timer first.
    #[instrument(skip(self), fields(task_queue = %self.definition.task_queue))]
    pub async fn shutdown(&self) {
        self.auto_start.lock().await.cancel();

        let (worker, connection) = {
            let mut state = self.state.lock().await;
            state.stopping = true;
            state.phase = WorkerState::ShuttingDown;
            (state.record.worker.take(), state.record.connection.take())
        };

        if let Some(worker) = worker {
            if let Err(e) = worker.shutdown().await {
                warn!(error = %e, "error during worker graceful stop");
            }
        }
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                warn!(error = %e, "error closing worker connection");
            }
        }

        let mut state = self.state.lock().await;
        state.record = WorkerRecord::default();
        state.phase = WorkerState::Stopped;
        state.stopping = false;
        info!("worker shut down");
    }

    /// Shutdown followed by a fresh initialization. In-flight work is not
    /// preserved. The caller decides whether to start afterwards.
    pub async fn restart(&self) -> Result<()> {
        info!(task_queue = %self.definition.task_queue, "restarting worker");
        self.shutdown().await;
        self.initialize().await
    }

    /// Point-in-time status snapshot.
    pub async fn status(&self) -> WorkerStatus {
        let state = self.state.lock().await;
        let uptime_ms = state
            .record
            .started_at
            .filter(|_| state.record.is_running)
            .map(|started| (Utc::now() - started).num_milliseconds().max(0) as u64);
        WorkerStatus {
            state: state.phase,
            is_initialized: state.record.is_initialized,
            is_running: state.record.is_running,
            last_error: state.record.last_error.clone(),
            started_at: state.record.started_at,
            uptime_ms,
            activities_count: state.record.activity_names.len(),
            workflow_source: state.record.workflow_source,
        }
    }

    /// Replace the auto-start token, dropping any previous timer, and
    /// return the fresh token for the new timer task.
    pub(crate) async fn arm_auto_start(&self) -> CancellationToken {
        let mut guard = self.auto_start.lock().await;
        guard.cancel();
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Degraded-or-fatal outcome for an initialization failure, per the
    /// definition's `allow_worker_failure` policy.
    async fn fail_initialization(&self, reason: String) -> Result<()> {
        if self.definition.allow_worker_failure {
            return self.enter_degraded(reason).await;
        }
        self.state.lock().await.phase = WorkerState::Uninitialized;
        Err(ForemanError::WorkerInitialization {
            task_queue: self.definition.task_queue.clone(),
            reason,
        })
    }

    async fn enter_degraded(&self, reason: String) -> Result<()> {
        warn!(
            task_queue = %self.definition.task_queue,
            reason = %reason,
            "running without worker"
        );
        let mut state = self.state.lock().await;
        state.record.last_error = Some(reason);
        state.phase = WorkerState::Degraded;
        Ok(())
    }
}
