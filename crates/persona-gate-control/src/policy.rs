// persona-gate-control/src/policy.rs
// ============================================================================
// Module: Policy Service and Loader
// Description: Evidence-gate policy versions with hot reload.
// Purpose: Keep the active policy authoritative in the store, cached in memory.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! The store's active policy row is the source of truth. The service writes
//! versions (creation deactivates predecessors, rollback re-activates an
//! older version) under admin audit. The loader keeps an in-memory snapshot
//! per name, refreshed on a TTL or an explicit invalidation, and stamps the
//! version string it served into every trace that used it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use persona_gate_core::AdminAuditStore;
use persona_gate_core::GatePolicy;
use persona_gate_core::PolicyStore;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use serde_json::json;

use crate::admin::record_admin_action;
use crate::error::ControlError;

// ============================================================================
// SECTION: Policy Service
// ============================================================================

/// Write-side policy operations.
pub struct PolicyService {
    /// Policy versions store.
    store: Arc<dyn PolicyStore>,
    /// Admin audit trail.
    audit: Arc<dyn AdminAuditStore>,
}

impl PolicyService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, audit: Arc<dyn AdminAuditStore>) -> Self {
        Self {
            store,
            audit,
        }
    }

    /// Returns the active policy version for a name.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when loading fails.
    pub fn active(&self, name: &str) -> Result<Option<GatePolicy>, ControlError> {
        Ok(self.store.active_policy(name)?)
    }

    /// Lists every version of a policy, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when loading fails.
    pub fn list_versions(&self, name: &str) -> Result<Vec<GatePolicy>, ControlError> {
        Ok(self.store.list_policy_versions(name)?)
    }

    /// Creates a new policy version, deactivating predecessors when active.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Conflict`] when the version already exists.
    pub fn create_version(
        &self,
        scope: &Scope,
        policy: &GatePolicy,
        operator: &str,
        now: Timestamp,
    ) -> Result<(), ControlError> {
        self.store.insert_policy(policy)?;
        record_admin_action(
            self.audit.as_ref(),
            scope,
            operator,
            "policy.create",
            "policy",
            &format!("{}@{}", policy.name, policy.version),
            json!({"version": policy.version, "is_active": policy.is_active}),
            now,
        );
        Ok(())
    }

    /// Imports a seed policy file when the store has no versions yet.
    ///
    /// Returns the seeded policy, or `None` when versions already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] when the file cannot be read or
    /// parsed.
    pub fn seed_from_file(
        &self,
        scope: &Scope,
        name: &str,
        path: &std::path::Path,
        now: Timestamp,
    ) -> Result<Option<GatePolicy>, ControlError> {
        if !self.store.list_policy_versions(name)?.is_empty() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ControlError::Validation(vec![format!("seed file: {err}")]))?;
        let mut policy: GatePolicy = serde_json::from_str(&raw)
            .map_err(|err| ControlError::Validation(vec![format!("seed file: {err}")]))?;
        policy.name = name.to_string();
        policy.is_active = true;
        self.create_version(scope, &policy, "seed", now)?;
        Ok(Some(policy))
    }

    /// Re-activates an older version (rollback).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotFound`] when the version does not exist.
    pub fn rollback(
        &self,
        scope: &Scope,
        name: &str,
        version: &str,
        operator: &str,
        now: Timestamp,
    ) -> Result<GatePolicy, ControlError> {
        let policy = self.store.set_active_policy(name, version)?;
        record_admin_action(
            self.audit.as_ref(),
            scope,
            operator,
            "policy.rollback",
            "policy",
            &format!("{name}@{version}"),
            json!({"version": version}),
            now,
        );
        Ok(policy)
    }
}

// ============================================================================
// SECTION: Policy Loader
// ============================================================================

/// Cached snapshot of one policy name.
struct PolicySnapshot {
    /// Loaded policy, if any version is active.
    policy: Option<GatePolicy>,
    /// Instant the snapshot was taken.
    loaded_at: Instant,
}

/// Read-side loader with TTL-based hot reload.
pub struct PolicyLoader {
    /// Policy versions store.
    store: Arc<dyn PolicyStore>,
    /// Policy name this loader serves.
    name: String,
    /// Snapshot TTL.
    ttl: Duration,
    /// Current snapshot.
    snapshot: Mutex<Option<PolicySnapshot>>,
}

impl PolicyLoader {
    /// Creates a loader for one policy name.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    /// Returns the active policy, served from the snapshot within the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when a refresh is needed and fails.
    pub fn get(&self) -> Result<Option<GatePolicy>, ControlError> {
        {
            let Ok(snapshot) = self.snapshot.lock() else {
                return Ok(self.store.active_policy(&self.name)?);
            };
            if let Some(current) = snapshot.as_ref()
                && current.loaded_at.elapsed() < self.ttl
            {
                return Ok(current.policy.clone());
            }
        }
        let policy = self.store.active_policy(&self.name)?;
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = Some(PolicySnapshot {
                policy: policy.clone(),
                loaded_at: Instant::now(),
            });
        }
        Ok(policy)
    }

    /// Drops the snapshot so the next read refreshes immediately.
    pub fn invalidate(&self) {
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = None;
        }
    }
}
