// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity registration and discovery.
//!
//! Activities are registered explicitly during application bootstrap and
//! discovered as a plain name-to-handler map when a worker is built. The
//! host marks the registry ready once registration is complete; a worker
//! initializing before that point polls readiness a bounded number of
//! times and then binds whatever is registered (degraded binding, never
//! a fatal error).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Error type returned by activity handlers.
pub type ActivityError = Box<dyn std::error::Error + Send + Sync>;

/// An invocable activity implementation.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Execute the activity with a JSON input, producing a JSON output.
    async fn call(&self, input: Value) -> std::result::Result<Value, ActivityError>;
}

/// Registry mapping activity names to handlers.
///
/// The discovery snapshot is cached and cleared on any re-registration,
/// so its size and freshness are observable rather than tied to garbage
/// collection.
pub struct ActivityRegistry {
    handlers: Mutex<HashMap<String, Arc<dyn ActivityHandler>>>,
    snapshot: Mutex<Option<HashMap<String, Arc<dyn ActivityHandler>>>>,
    ready: AtomicBool,
}

impl ActivityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            snapshot: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Register a handler under the given activity name.
    ///
    /// Re-registering a name replaces the previous handler and invalidates
    /// the discovery snapshot.
    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn ActivityHandler>) {
        let name = name.into();
        let replaced = self
            .handlers
            .lock()
            .await
            .insert(name.clone(), handler)
            .is_some();
        if replaced {
            warn!(activity = %name, "activity handler replaced");
        } else {
            debug!(activity = %name, "activity handler registered");
        }
        *self.snapshot.lock().await = None;
    }

    /// Mark registration as complete.
    ///
    /// Called by the host once all components have registered their
    /// activities; workers initializing before this point wait via
    /// [`ActivityRegistry::wait_ready`].
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Whether the host has finished registering activities.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Poll readiness up to `max_attempts` times with `delay` between
    /// polls. Returns the final readiness; callers proceed either way.
    pub async fn wait_ready(&self, max_attempts: u32, delay: Duration) -> bool {
        for attempt in 1..=max_attempts {
            if self.is_ready() {
                return true;
            }
            debug!(attempt, max_attempts, "activity registry not ready yet");
            tokio::time::sleep(delay).await;
        }
        if !self.is_ready() {
            warn!(
                max_attempts,
                "activity registry never marked ready; binding whatever is registered"
            );
        }
        self.is_ready()
    }

    /// Snapshot of the current name-to-handler map.
    pub async fn discover(&self) -> HashMap<String, Arc<dyn ActivityHandler>> {
        if let Some(snapshot) = self.snapshot.lock().await.as_ref() {
            return snapshot.clone();
        }
        let snapshot = self.handlers.lock().await.clone();
        *self.snapshot.lock().await = Some(snapshot.clone());
        snapshot
    }

    /// Number of registered activities.
    pub async fn len(&self) -> usize {
        self.handlers.lock().await.len()
    }

    /// Whether no activities are registered.
    pub async fn is_empty(&self) -> bool {
        self.handlers.lock().await.is_empty()
    }
}

impl Default for ActivityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
