// persona-gate-orchestrator/src/runtime.rs
// ============================================================================
// Module: Cached Runtime Config
// Description: TTL-cached, single-flight runtime bundle lookup.
// Purpose: Keep release lookups off the hot path without staleness surprises.
// Dependencies: persona-gate-control, tokio
// ============================================================================

//! ## Overview
//! Runtime bundles are cached per `(tenant, site, npc)` with a short TTL.
//! Misses fetch under an async lock with a double check, so concurrent
//! turns for the same key share one store round-trip. Fetch failures fall
//! back to the empty bundle (active policy semantics) rather than failing
//! the turn; activation paths call `invalidate` to cut the staleness
//! window.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use persona_gate_control::RuntimeConfig;
use persona_gate_control::RuntimeConfigService;
use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use tokio::sync::Mutex;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// TTL-cached runtime config source.
pub struct CachedRuntimeConfig {
    /// Backing service.
    service: Arc<RuntimeConfigService>,
    /// Entry TTL.
    ttl: Duration,
    /// Cached bundles keyed by `(tenant, site, npc)`.
    entries: Mutex<HashMap<String, (RuntimeConfig, Instant)>>,
}

impl CachedRuntimeConfig {
    /// Creates the cache over a runtime config service.
    #[must_use]
    pub fn new(service: Arc<RuntimeConfigService>, ttl: Duration) -> Self {
        Self {
            service,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the cache key for a scope and optional NPC.
    fn key(scope: &Scope, npc_id: Option<&NpcId>) -> String {
        format!("{}:{}:{}", scope.tenant_id, scope.site_id, npc_id.map_or("", NpcId::as_str))
    }

    /// Returns the runtime bundle, fetching on miss with a double check.
    pub async fn get(&self, scope: &Scope, npc_id: Option<&NpcId>) -> RuntimeConfig {
        let key = Self::key(scope, npc_id);
        let mut entries = self.entries.lock().await;
        if let Some((config, fetched_at)) = entries.get(&key)
            && fetched_at.elapsed() < self.ttl
        {
            return config.clone();
        }
        // Holding the lock across the fetch makes concurrent misses for the
        // same key wait for one round-trip instead of issuing their own.
        let config = self.service.get_config(scope, npc_id).unwrap_or_default();
        entries.insert(key, (config.clone(), Instant::now()));
        config
    }

    /// Drops every cached bundle for a scope.
    pub async fn invalidate(&self, scope: &Scope) {
        let prefix = format!("{}:{}:", scope.tenant_id, scope.site_id);
        let mut entries = self.entries.lock().await;
        entries.retain(|key, _| !key.starts_with(&prefix));
    }
}
