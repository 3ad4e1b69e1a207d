// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection registry: caching, health checking and bounded-retry
//! creation of client and worker connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ConnectionConfig;
use crate::error::{ForemanError, Result};
use crate::keying::connection_key;
use crate::transport::{ClientHandle, Transport, WorkerConnection};
use crate::types::ConnectionHealth;

/// Caches live client and worker connections keyed by endpoint identity,
/// and owns the retry/backoff and health-check policy for creating new
/// ones.
///
/// The registry exclusively owns the cached handles. Health is
/// re-evaluated on every lookup, never cached as a boolean: a handle can
/// become unusable without notification (e.g. a remote disconnect), so a
/// healthy result is only good for the lookup that produced it.
///
/// Concurrent callers for the same cold key may each attempt creation;
/// there is no single-flight deduplication. The last successful insert
/// wins and earlier handles are replaced.
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    clients: Mutex<HashMap<String, Arc<dyn ClientHandle>>>,
    worker_connections: Mutex<HashMap<String, Arc<dyn WorkerConnection>>>,
    /// Failed creation attempts per key. Cleared on success or via
    /// [`ConnectionRegistry::clear_attempts`]; once at the configured
    /// bound, no further network attempt is made for that key.
    attempts: Mutex<HashMap<String, u32>>,
}

impl ConnectionRegistry {
    /// Create a registry wrapping the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            clients: Mutex::new(HashMap::new()),
            worker_connections: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cached client connection for this config, creating it if
    /// needed.
    ///
    /// Returns `Ok(None)` when the config has no endpoint (absence of
    /// configuration is not an error) and when creation exhausted its
    /// retry budget with `allow_connection_failure` set.
    #[instrument(skip_all)]
    pub async fn get_or_create_client(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Option<Arc<dyn ClientHandle>>> {
        let Some(address) = config.server_addr.clone() else {
            debug!("no server address configured, skipping client connection");
            return Ok(None);
        };
        let key = connection_key(config);

        if let Some(existing) = self.clients.lock().await.get(&key).cloned() {
            if existing.check_health().await.is_ok() {
                debug!(key = %key, "reusing cached client connection");
                return Ok(Some(existing));
            }
            warn!(key = %key, "cached client connection unhealthy, discarding");
            self.clients.lock().await.remove(&key);
            if let Err(e) = existing.close().await {
                warn!(key = %key, error = %e, "failed to close unhealthy client connection");
            }
        }

        let effective = Self::effective_config(config);
        let max_attempts = config.max_retry_attempts.max(1);
        loop {
            let pending = self.attempts.lock().await.get(&key).copied().unwrap_or(0);
            if pending >= max_attempts {
                return self.give_up(config, &address, pending);
            }

            match self.transport.open_client(&effective).await {
                Ok(handle) => {
                    self.attempts.lock().await.remove(&key);
                    self.clients.lock().await.insert(key.clone(), handle.clone());
                    info!(address = %address, key = %key, "client connection established");
                    return Ok(Some(handle));
                }
                Err(e) => {
                    let attempt = self.record_failure(&key).await;
                    warn!(
                        address = %address,
                        attempt,
                        max_attempts,
                        error = %e,
                        "client connection attempt failed"
                    );
                    if attempt >= max_attempts {
                        return self.give_up(config, &address, attempt);
                    }
                    tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
                }
            }
        }
    }

    /// Get the cached worker transport connection for this config,
    /// creating it if needed. Same contract as
    /// [`ConnectionRegistry::get_or_create_client`].
    #[instrument(skip_all)]
    pub async fn get_or_create_worker_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Option<Arc<dyn WorkerConnection>>> {
        let Some(address) = config.server_addr.clone() else {
            debug!("no server address configured, skipping worker connection");
            return Ok(None);
        };
        let key = connection_key(config);

        if let Some(existing) = self.worker_connections.lock().await.get(&key).cloned() {
            if existing.check_health().await.is_ok() {
                debug!(key = %key, "reusing cached worker connection");
                return Ok(Some(existing));
            }
            warn!(key = %key, "cached worker connection unhealthy, discarding");
            self.worker_connections.lock().await.remove(&key);
            if let Err(e) = existing.close().await {
                warn!(key = %key, error = %e, "failed to close unhealthy worker connection");
            }
        }

        let effective = Self::effective_config(config);
        let max_attempts = config.max_retry_attempts.max(1);
        loop {
            let pending = self.attempts.lock().await.get(&key).copied().unwrap_or(0);
            if pending >= max_attempts {
                return self.give_up(config, &address, pending);
            }

            match self.transport.open_worker_connection(&effective).await {
                Ok(handle) => {
                    self.attempts.lock().await.remove(&key);
                    self.worker_connections
                        .lock()
                        .await
                        .insert(key.clone(), handle.clone());
                    info!(address = %address, key = %key, "worker connection established");
                    return Ok(Some(handle));
                }
                Err(e) => {
                    let attempt = self.record_failure(&key).await;
                    warn!(
                        address = %address,
                        attempt,
                        max_attempts,
                        error = %e,
                        "worker connection attempt failed"
                    );
                    if attempt >= max_attempts {
                        return self.give_up(config, &address, attempt);
                    }
                    tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
                }
            }
        }
    }

    /// Reset the attempt counter for this config's endpoint, re-enabling
    /// creation after the retry budget was exhausted.
    pub async fn clear_attempts(&self, config: &ConnectionConfig) {
        self.attempts.lock().await.remove(&connection_key(config));
    }

    /// Health snapshot of the registry.
    pub async fn health(&self) -> ConnectionHealth {
        ConnectionHealth {
            client_connections: self.clients.lock().await.len(),
            worker_connections: self.worker_connections.lock().await.len(),
            total_pending_attempts: self.attempts.lock().await.values().sum(),
        }
    }

    /// Close every cached connection and clear all state.
    ///
    /// Called once at process teardown. Close failures are logged and
    /// swallowed; teardown always completes.
    pub async fn close_all(&self) {
        let clients: Vec<_> = self.clients.lock().await.drain().collect();
        for (key, client) in clients {
            if let Err(e) = client.close().await {
                warn!(key = %key, error = %e, "failed to close client connection during teardown");
            }
        }

        let connections: Vec<_> = self.worker_connections.lock().await.drain().collect();
        for (key, connection) in connections {
            if let Err(e) = connection.close().await {
                warn!(key = %key, error = %e, "failed to close worker connection during teardown");
            }
        }

        self.attempts.lock().await.clear();
        info!("connection registry closed");
    }

    /// Config as handed to the transport: user metadata with the derived
    /// bearer entry merged in. TLS and proxy pass through untouched.
    fn effective_config(config: &ConnectionConfig) -> ConnectionConfig {
        let mut effective = config.clone();
        effective.metadata = config.effective_metadata();
        effective
    }

    async fn record_failure(&self, key: &str) -> u32 {
        let mut attempts = self.attempts.lock().await;
        let counter = attempts.entry(key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Outcome when the retry budget for an endpoint is exhausted:
    /// degraded (`Ok(None)`) when connection failure is tolerated, fatal
    /// otherwise.
    fn give_up<T>(
        &self,
        config: &ConnectionConfig,
        address: &str,
        attempts: u32,
    ) -> Result<Option<T>> {
        if config.allow_connection_failure {
            warn!(
                address = %address,
                attempts,
                "giving up on connection, continuing without it"
            );
            return Ok(None);
        }
        Err(ForemanError::Connection {
            address: address.to_string(),
            attempts,
        })
    }
}
