// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared in-process mock transport for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use foreman_sdk::{
    ClientHandle, ConnectionConfig, Transport, TransportError, WorkerConnection, WorkerHandle,
    WorkerSpawnSpec,
};
use tokio::sync::Notify;

/// Mock client/worker connection handle with controllable health.
#[derive(Debug)]
pub struct MockHandle {
    healthy: AtomicBool,
    fail_close: AtomicBool,
    pub close_calls: AtomicUsize,
}

impl MockHandle {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            fail_close: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    async fn do_check_health(&self) -> Result<(), TransportError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }

    async fn do_close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            Err(TransportError::Close("mock close failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClientHandle for MockHandle {
    async fn check_health(&self) -> Result<(), TransportError> {
        self.do_check_health().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.do_close().await
    }
}

#[async_trait]
impl WorkerConnection for MockHandle {
    async fn check_health(&self) -> Result<(), TransportError> {
        self.do_check_health().await
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.do_close().await
    }
}

/// Mock worker whose poll loop suspends until a graceful stop.
pub struct MockWorker {
    stop: Notify,
    fail_run: Mutex<Option<String>>,
    pub run_calls: AtomicUsize,
    pub shutdown_calls: AtomicUsize,
}

impl MockWorker {
    fn new(fail_run: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            stop: Notify::new(),
            fail_run: Mutex::new(fail_run),
            run_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        })
    }

    pub fn run_count(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerHandle for MockWorker {
    async fn run(&self) -> Result<(), TransportError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.fail_run.lock().unwrap().take() {
            return Err(TransportError::PollLoop(message));
        }
        self.stop.notified().await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.stop.notify_one();
        Ok(())
    }
}

/// Mock transport with call counting and scriptable failures.
pub struct MockTransport {
    pub client_opens: AtomicUsize,
    pub worker_opens: AtomicUsize,
    pub worker_creates: AtomicUsize,
    fail_connections: AtomicBool,
    fail_worker_creation: AtomicBool,
    fail_next_run: Mutex<Option<String>>,
    /// Metadata of the most recent open call, for bearer-merge assertions
    pub last_metadata: Mutex<Option<HashMap<String, String>>>,
    /// Every handle ever opened, in order
    pub handles: Mutex<Vec<Arc<MockHandle>>>,
    /// Every worker ever created, in order
    pub workers: Mutex<Vec<Arc<MockWorker>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            client_opens: AtomicUsize::new(0),
            worker_opens: AtomicUsize::new(0),
            worker_creates: AtomicUsize::new(0),
            fail_connections: AtomicBool::new(false),
            fail_worker_creation: AtomicBool::new(false),
            fail_next_run: Mutex::new(None),
            last_metadata: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// A transport whose connection attempts always fail.
    pub fn failing() -> Arc<Self> {
        let transport = Self::new();
        transport.set_fail_connections(true);
        transport
    }

    pub fn set_fail_connections(&self, fail: bool) {
        self.fail_connections.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_worker_creation(&self, fail: bool) {
        self.fail_worker_creation.store(fail, Ordering::SeqCst);
    }

    /// Make the next created worker's poll loop fail with this message.
    pub fn fail_next_run(&self, message: &str) {
        *self.fail_next_run.lock().unwrap() = Some(message.to_string());
    }

    pub fn client_open_count(&self) -> usize {
        self.client_opens.load(Ordering::SeqCst)
    }

    pub fn worker_open_count(&self) -> usize {
        self.worker_opens.load(Ordering::SeqCst)
    }

    pub fn worker_create_count(&self) -> usize {
        self.worker_creates.load(Ordering::SeqCst)
    }

    pub fn total_open_count(&self) -> usize {
        self.client_open_count() + self.worker_open_count()
    }

    pub fn handle(&self, index: usize) -> Arc<MockHandle> {
        self.handles.lock().unwrap()[index].clone()
    }

    pub fn worker(&self, index: usize) -> Arc<MockWorker> {
        self.workers.lock().unwrap()[index].clone()
    }

    fn open_handle(&self, config: &ConnectionConfig) -> Result<Arc<MockHandle>, TransportError> {
        *self.last_metadata.lock().unwrap() = Some(config.metadata.clone());
        if self.fail_connections.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("mock connect refused".to_string()));
        }
        let handle = MockHandle::new();
        self.handles.lock().unwrap().push(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_client(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn ClientHandle>, TransportError> {
        self.client_opens.fetch_add(1, Ordering::SeqCst);
        let handle = self.open_handle(config)?;
        Ok(handle)
    }

    async fn open_worker_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn WorkerConnection>, TransportError> {
        self.worker_opens.fetch_add(1, Ordering::SeqCst);
        let handle = self.open_handle(config)?;
        Ok(handle)
    }

    async fn create_worker(
        &self,
        _connection: Arc<dyn WorkerConnection>,
        _spec: &WorkerSpawnSpec,
    ) -> Result<Arc<dyn WorkerHandle>, TransportError> {
        self.worker_creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_worker_creation.load(Ordering::SeqCst) {
            return Err(TransportError::WorkerCreation(
                "mock worker creation refused".to_string(),
            ));
        }
        let worker = MockWorker::new(self.fail_next_run.lock().unwrap().take());
        self.workers.lock().unwrap().push(worker.clone());
        Ok(worker)
    }
}

/// Connection config pointing at the mock transport with a fast backoff.
pub fn test_connection() -> ConnectionConfig {
    ConnectionConfig::new("localhost:7233").with_retry_backoff_ms(1)
}
