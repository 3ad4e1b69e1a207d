// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cache key derivation for connection configurations.

use crate::config::ConnectionConfig;

/// Derive the stable cache key for a connection configuration.
///
/// Pure and total. Format: `{address}:{namespace}:{auth|noauth}`. A missing
/// namespace keys as `"default"`, so two configs differing only in an
/// explicit-vs-omitted default namespace alias to the same connection.
/// API-key *presence* (not its value) participates, so authenticated and
/// unauthenticated connections to the same address are never aliased.
/// TLS material and metadata never affect identity.
pub fn connection_key(config: &ConnectionConfig) -> String {
    let address = config.server_addr.as_deref().unwrap_or("");
    let namespace = config.namespace_or_default();
    let auth = if config.api_key.is_some() {
        "auth"
    } else {
        "noauth"
    };
    format!("{address}:{namespace}:{auth}")
}
