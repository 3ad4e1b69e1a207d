// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection and worker configuration.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{ForemanError, Result};
use crate::types::WorkflowSource;

/// Namespace used when a config does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Maximum connection creation attempts per endpoint before giving up.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between connection creation attempts.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 1_000;

/// TLS material for a connection. Passed through verbatim to the
/// transport; the registry never interprets it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Server name override for certificate verification
    pub server_name: Option<String>,
    /// Client certificate (PEM)
    pub client_cert_pem: Option<Vec<u8>>,
    /// Client private key (PEM)
    pub client_key_pem: Option<Vec<u8>>,
    /// Root CA to verify the server against (PEM)
    pub server_root_ca_pem: Option<Vec<u8>>,
}

/// Proxy descriptor. Passed through verbatim like TLS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Proxy target address (host:port)
    pub target_host: String,
    /// Basic auth user
    pub basic_auth_user: Option<String>,
    /// Basic auth password
    pub basic_auth_pass: Option<String>,
}

/// Target endpoint description for client and worker connections.
///
/// Immutable once handed to the registry. Identity for caching purposes is
/// address + namespace + API-key presence; TLS detail and metadata do not
/// participate (see [`crate::keying::connection_key`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server address (host:port). `None` means unconfigured: connection
    /// requests are a no-op rather than an error.
    pub server_addr: Option<String>,
    /// Logical namespace (default: "default")
    pub namespace: Option<String>,
    /// TLS material, or `None` for plaintext
    pub tls: Option<TlsOptions>,
    /// API key; presence adds an `authorization: Bearer` metadata entry
    pub api_key: Option<String>,
    /// Free-form metadata forwarded on every transport call
    pub metadata: HashMap<String, String>,
    /// Optional proxy descriptor
    pub proxy: Option<ProxyOptions>,
    /// Continue in degraded mode (return no connection) after exhausting
    /// retries instead of failing fatally (default: true)
    pub allow_connection_failure: bool,
    /// Creation attempts per endpoint before giving up (default: 3)
    pub max_retry_attempts: u32,
    /// Delay between creation attempts in milliseconds (default: 1000)
    pub retry_backoff_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: None,
            namespace: None,
            tls: None,
            api_key: None,
            metadata: HashMap::new(),
            proxy: None,
            allow_connection_failure: true,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration for the given server address.
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: Some(server_addr.into()),
            ..Default::default()
        }
    }

    /// Create a configuration for local development (`localhost:7233`).
    pub fn localhost() -> Self {
        Self::new("localhost:7233")
    }

    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `FOREMAN_SERVER_ADDR` - Server address (unset = unconfigured)
    /// - `FOREMAN_NAMESPACE` - Logical namespace (default: "default")
    /// - `FOREMAN_API_KEY` - API key for bearer authentication
    /// - `FOREMAN_ALLOW_CONNECTION_FAILURE` - Degrade instead of failing
    ///   after exhausting retries (default: true)
    /// - `FOREMAN_MAX_RETRY_ATTEMPTS` - Creation attempts (default: 3)
    /// - `FOREMAN_RETRY_BACKOFF_MS` - Delay between attempts (default: 1000)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.server_addr = env::var("FOREMAN_SERVER_ADDR").ok();
        config.namespace = env::var("FOREMAN_NAMESPACE").ok();
        config.api_key = env::var("FOREMAN_API_KEY").ok();
        if let Ok(v) = env::var("FOREMAN_ALLOW_CONNECTION_FAILURE") {
            config.allow_connection_failure = v != "false" && v != "0";
        }
        if let Some(v) = env::var("FOREMAN_MAX_RETRY_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_retry_attempts = v;
        }
        if let Some(v) = env::var("FOREMAN_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.retry_backoff_ms = v;
        }
        config
    }

    /// Set the logical namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the TLS material.
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Add a metadata entry forwarded on every transport call.
    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the proxy descriptor.
    pub fn with_proxy(mut self, proxy: ProxyOptions) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Fail fatally instead of degrading when retries are exhausted.
    pub fn with_allow_connection_failure(mut self, allow: bool) -> Self {
        self.allow_connection_failure = allow;
        self
    }

    /// Set the retry attempt bound.
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Set the delay between creation attempts.
    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Namespace with the `"default"` fallback applied.
    pub fn namespace_or_default(&self) -> &str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }

    /// Metadata as sent on transport calls.
    ///
    /// An API key, when present, becomes an `authorization: Bearer {key}`
    /// entry merged into the user-supplied metadata. User entries survive
    /// the merge; a user-supplied `authorization` entry is overridden by
    /// the derived one.
    pub fn effective_metadata(&self) -> HashMap<String, String> {
        let mut metadata = self.metadata.clone();
        if let Some(key) = &self.api_key {
            metadata.insert("authorization".to_string(), format!("Bearer {key}"));
        }
        metadata
    }
}

/// Environment tier the process runs in, selecting a default worker
/// concurrency profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentTier {
    /// Lighter concurrency profile for local iteration
    #[default]
    Development,
    /// Heavier profile for production deployments
    Production,
}

impl EnvironmentTier {
    /// Detect the tier from `FOREMAN_ENV` (default: development).
    pub fn detect() -> Self {
        env::var("FOREMAN_ENV")
            .map(|v| Self::from_label(&v))
            .unwrap_or_default()
    }

    /// Parse a tier label. Unknown labels fall back to development.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => EnvironmentTier::Production,
            _ => EnvironmentTier::Development,
        }
    }

    /// Default worker tuning for this tier.
    pub fn default_tuning(self) -> WorkerTuning {
        match self {
            EnvironmentTier::Development => WorkerTuning {
                max_concurrent_activities: 10,
                max_concurrent_workflow_tasks: 10,
                max_cached_workflows: 100,
                shutdown_grace_ms: 5_000,
            },
            EnvironmentTier::Production => WorkerTuning {
                max_concurrent_activities: 100,
                max_concurrent_workflow_tasks: 40,
                max_cached_workflows: 1_000,
                shutdown_grace_ms: 30_000,
            },
        }
    }
}

/// Concurrency and shutdown tuning a worker is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTuning {
    /// Activities executed concurrently
    pub max_concurrent_activities: u32,
    /// Workflow tasks executed concurrently
    pub max_concurrent_workflow_tasks: u32,
    /// Workflow instances kept cached between tasks
    pub max_cached_workflows: u32,
    /// Grace period for in-flight work during shutdown
    pub shutdown_grace_ms: u64,
}

/// User-supplied tuning overrides, merged field-wise over the
/// environment-tier defaults (user values win).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerTuningOverrides {
    /// Override for [`WorkerTuning::max_concurrent_activities`]
    pub max_concurrent_activities: Option<u32>,
    /// Override for [`WorkerTuning::max_concurrent_workflow_tasks`]
    pub max_concurrent_workflow_tasks: Option<u32>,
    /// Override for [`WorkerTuning::max_cached_workflows`]
    pub max_cached_workflows: Option<u32>,
    /// Override for [`WorkerTuning::shutdown_grace_ms`]
    pub shutdown_grace_ms: Option<u64>,
}

impl WorkerTuningOverrides {
    /// Apply these overrides on top of a base tuning.
    pub fn merge_into(&self, base: WorkerTuning) -> WorkerTuning {
        WorkerTuning {
            max_concurrent_activities: self
                .max_concurrent_activities
                .unwrap_or(base.max_concurrent_activities),
            max_concurrent_workflow_tasks: self
                .max_concurrent_workflow_tasks
                .unwrap_or(base.max_concurrent_workflow_tasks),
            max_cached_workflows: self
                .max_cached_workflows
                .unwrap_or(base.max_cached_workflows),
            shutdown_grace_ms: self.shutdown_grace_ms.unwrap_or(base.shutdown_grace_ms),
        }
    }
}

/// Definition of one worker, bound one-to-one to a task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerDefinition {
    /// Task queue the worker polls (mandatory, non-empty)
    pub task_queue: String,
    /// Filesystem path to workflow definitions
    pub workflows_path: Option<String>,
    /// Pre-built workflow bundle
    pub workflow_bundle: Option<Vec<u8>>,
    /// Endpoint the worker connects to
    pub connection: ConnectionConfig,
    /// Start the worker automatically after registration (default: true)
    pub auto_start: bool,
    /// Delay before the automatic start, in milliseconds
    pub start_delay_ms: u64,
    /// Continue running the application without this worker if
    /// initialization fails (default: true)
    pub allow_worker_failure: bool,
    /// Tuning overrides applied over the environment-tier defaults
    pub tuning: WorkerTuningOverrides,
}

impl Default for WorkerDefinition {
    fn default() -> Self {
        Self {
            task_queue: String::new(),
            workflows_path: None,
            workflow_bundle: None,
            connection: ConnectionConfig::default(),
            auto_start: true,
            start_delay_ms: 0,
            allow_worker_failure: true,
            tuning: WorkerTuningOverrides::default(),
        }
    }
}

impl WorkerDefinition {
    /// Create a definition for the given task queue.
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            ..Default::default()
        }
    }

    /// Set the filesystem workflow source.
    pub fn with_workflows_path(mut self, path: impl Into<String>) -> Self {
        self.workflows_path = Some(path.into());
        self
    }

    /// Set the pre-built workflow bundle source.
    pub fn with_workflow_bundle(mut self, bundle: Vec<u8>) -> Self {
        self.workflow_bundle = Some(bundle);
        self
    }

    /// Set the connection configuration.
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Enable or disable the automatic start after registration.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Delay the automatic start.
    pub fn with_start_delay_ms(mut self, delay_ms: u64) -> Self {
        self.start_delay_ms = delay_ms;
        self
    }

    /// Fail application startup instead of degrading when this worker
    /// cannot be initialized.
    pub fn with_allow_worker_failure(mut self, allow: bool) -> Self {
        self.allow_worker_failure = allow;
        self
    }

    /// Set tuning overrides.
    pub fn with_tuning(mut self, tuning: WorkerTuningOverrides) -> Self {
        self.tuning = tuning;
        self
    }

    /// Validate the definition and resolve its workflow source.
    ///
    /// Validation errors are programmer errors: raised synchronously,
    /// before any transport call, and never retried.
    pub fn validate(&self) -> Result<WorkflowSource> {
        if self.task_queue.trim().is_empty() {
            return Err(ForemanError::Configuration(
                "worker definition requires a task queue name".to_string(),
            ));
        }
        match (&self.workflows_path, &self.workflow_bundle) {
            (Some(_), Some(_)) => Err(ForemanError::Configuration(format!(
                "worker '{}': workflows_path and workflow_bundle are mutually exclusive",
                self.task_queue
            ))),
            (None, None) => Err(ForemanError::Configuration(format!(
                "worker '{}': exactly one of workflows_path or workflow_bundle is required",
                self.task_queue
            ))),
            (Some(path), None) => Ok(WorkflowSource::Filesystem(path.clone())),
            (None, Some(bundle)) => Ok(WorkflowSource::Bundle(bundle.clone())),
        }
    }

    /// Merged tuning for this worker under the given environment tier.
    pub fn resolved_tuning(&self, tier: EnvironmentTier) -> WorkerTuning {
        self.tuning.merge_into(tier.default_tuning())
    }
}
