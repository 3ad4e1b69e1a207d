// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the connection registry: caching, health checks, retries.

mod common;

use std::sync::Arc;

use common::{MockTransport, test_connection};
use foreman_sdk::{ConnectionConfig, ConnectionRegistry, ForemanError};

fn registry(transport: &Arc<MockTransport>) -> ConnectionRegistry {
    ConnectionRegistry::new(transport.clone())
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn test_client_cached_and_opened_exactly_once() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection();

    let first = registry.get_or_create_client(&config).await.unwrap().unwrap();
    let second = registry.get_or_create_client(&config).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.client_open_count(), 1);
}

#[tokio::test]
async fn test_client_and_worker_connection_caches_are_independent() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection();

    registry.get_or_create_client(&config).await.unwrap().unwrap();
    registry
        .get_or_create_worker_connection(&config)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(transport.client_open_count(), 1);
    assert_eq!(transport.worker_open_count(), 1);

    let health = registry.health().await;
    assert_eq!(health.client_connections, 1);
    assert_eq!(health.worker_connections, 1);
}

#[tokio::test]
async fn test_no_endpoint_is_a_no_op() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = ConnectionConfig::default();

    let client = registry.get_or_create_client(&config).await.unwrap();
    let connection = registry
        .get_or_create_worker_connection(&config)
        .await
        .unwrap();

    assert!(client.is_none());
    assert!(connection.is_none());
    assert_eq!(transport.total_open_count(), 0);
}

#[tokio::test]
async fn test_namespace_distinguishes_cache_entries() {
    let transport = MockTransport::new();
    let registry = registry(&transport);

    registry
        .get_or_create_client(&test_connection())
        .await
        .unwrap()
        .unwrap();
    registry
        .get_or_create_client(&test_connection().with_namespace("payments"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(transport.client_open_count(), 2);
    assert_eq!(registry.health().await.client_connections, 2);
}

#[tokio::test]
async fn test_concurrent_lookups_on_a_warm_key_share_the_handle() {
    let transport = MockTransport::new();
    let registry = Arc::new(registry(&transport));
    let config = test_connection();

    let first = registry.get_or_create_client(&config).await.unwrap().unwrap();

    let lookups = (0..8).map(|_| {
        let registry = registry.clone();
        let config = config.clone();
        async move { registry.get_or_create_client(&config).await.unwrap().unwrap() }
    });
    for handle in futures::future::join_all(lookups).await {
        assert!(Arc::ptr_eq(&first, &handle));
    }
    assert_eq!(transport.client_open_count(), 1);
}

// ============================================================================
// Retry bound
// ============================================================================

#[tokio::test]
async fn test_retry_bound_degraded_returns_none_after_three_attempts() {
    let transport = MockTransport::failing();
    let registry = registry(&transport);
    let config = test_connection();

    let client = registry.get_or_create_client(&config).await.unwrap();

    assert!(client.is_none());
    assert_eq!(transport.client_open_count(), 3);
    assert_eq!(registry.health().await.total_pending_attempts, 3);
}

#[tokio::test]
async fn test_retry_bound_fatal_names_attempt_count() {
    let transport = MockTransport::failing();
    let registry = registry(&transport);
    let config = test_connection().with_allow_connection_failure(false);

    let err = registry.get_or_create_client(&config).await.unwrap_err();

    assert_eq!(transport.client_open_count(), 3);
    match &err {
        ForemanError::Connection { address, attempts } => {
            assert_eq!(address, "localhost:7233");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert!(err.to_string().contains("after 3 attempts"));
}

#[tokio::test]
async fn test_exhausted_budget_blocks_attempts_until_cleared() {
    let transport = MockTransport::failing();
    let registry = registry(&transport);
    let config = test_connection();

    assert!(registry.get_or_create_client(&config).await.unwrap().is_none());
    assert_eq!(transport.client_open_count(), 3);

    // Budget exhausted: no further network attempt is made.
    assert!(registry.get_or_create_client(&config).await.unwrap().is_none());
    assert_eq!(transport.client_open_count(), 3);

    // Clearing the counter re-enables creation.
    registry.clear_attempts(&config).await;
    transport.set_fail_connections(false);
    let client = registry.get_or_create_client(&config).await.unwrap();
    assert!(client.is_some());
    assert_eq!(transport.client_open_count(), 4);
}

#[tokio::test]
async fn test_success_clears_attempt_counter() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    // Two failures, then success on the third attempt.
    transport.set_fail_connections(true);
    let config = test_connection()
        .with_max_retry_attempts(5)
        .with_retry_backoff_ms(20);

    let failing_registry_call = async {
        // Flip the transport back to healthy from a second task while the
        // registry is backing off.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        transport.set_fail_connections(false);
    };
    let (client, ()) = tokio::join!(registry.get_or_create_client(&config), failing_registry_call);

    assert!(client.unwrap().is_some());
    assert_eq!(registry.health().await.total_pending_attempts, 0);
}

// ============================================================================
// Health predicate
// ============================================================================

#[tokio::test]
async fn test_unhealthy_cached_client_is_replaced() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection();

    let first = registry.get_or_create_client(&config).await.unwrap().unwrap();
    transport.handle(0).set_healthy(false);

    let second = registry.get_or_create_client(&config).await.unwrap().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(transport.client_open_count(), 2);
    // The stale handle was closed, best effort.
    assert_eq!(transport.handle(0).close_count(), 1);
    assert_eq!(registry.health().await.client_connections, 1);
}

#[tokio::test]
async fn test_failed_close_of_unhealthy_handle_is_swallowed_and_not_counted() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection();

    registry.get_or_create_client(&config).await.unwrap().unwrap();
    let stale = transport.handle(0);
    stale.set_healthy(false);
    stale.set_fail_close(true);

    let replacement = registry.get_or_create_client(&config).await.unwrap();

    assert!(replacement.is_some());
    assert_eq!(stale.close_count(), 1);
    // A failed close is not a failed creation attempt.
    assert_eq!(registry.health().await.total_pending_attempts, 0);
}

// ============================================================================
// Metadata / auth
// ============================================================================

#[tokio::test]
async fn test_api_key_merged_as_bearer_metadata() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection()
        .with_api_key("secret")
        .with_metadata_entry("x-team", "orders");

    registry.get_or_create_client(&config).await.unwrap().unwrap();

    let metadata = transport.last_metadata.lock().unwrap().clone().unwrap();
    assert_eq!(
        metadata.get("authorization").map(String::as_str),
        Some("Bearer secret")
    );
    assert_eq!(metadata.get("x-team").map(String::as_str), Some("orders"));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn test_close_all_releases_everything() {
    let transport = MockTransport::new();
    let registry = registry(&transport);
    let config = test_connection();

    registry.get_or_create_client(&config).await.unwrap().unwrap();
    registry
        .get_or_create_worker_connection(&config)
        .await
        .unwrap()
        .unwrap();

    registry.close_all().await;

    assert_eq!(transport.handle(0).close_count(), 1);
    assert_eq!(transport.handle(1).close_count(), 1);
    let health = registry.health().await;
    assert_eq!(health.client_connections, 0);
    assert_eq!(health.worker_connections, 0);
    assert_eq!(health.total_pending_attempts, 0);
}

#[tokio::test]
async fn test_close_all_swallows_close_failures() {
    let transport = MockTransport::new();
    let registry = registry(&transport);

    registry
        .get_or_create_client(&test_connection())
        .await
        .unwrap()
        .unwrap();
    transport.handle(0).set_fail_close(true);

    // Must complete without panicking or erroring.
    registry.close_all().await;
    assert_eq!(registry.health().await.client_connections, 0);
}
