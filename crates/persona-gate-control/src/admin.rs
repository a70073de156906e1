// persona-gate-control/src/admin.rs
// ============================================================================
// Module: Admin Audit Helper
// Description: Append-only recording of control-plane actions.
// Purpose: Keep a uniform audit trail across every service.
// Dependencies: persona-gate-core, uuid
// ============================================================================

//! ## Overview
//! Every privileged control-plane action records one admin audit entry:
//! actor, action label, target, and the payload needed to replay the
//! decision. Audit failures never fail the action itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_core::AdminAuditEntry;
use persona_gate_core::AdminAuditStore;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// SECTION: Recording
// ============================================================================

/// Records one control-plane action, best effort.
pub fn record_admin_action(
    store: &dyn AdminAuditStore,
    scope: &Scope,
    actor: &str,
    action: &str,
    target_type: &str,
    target_id: &str,
    payload: Value,
    now: Timestamp,
) {
    let entry = AdminAuditEntry {
        id: Uuid::new_v4().to_string(),
        scope: scope.clone(),
        actor: actor.to_string(),
        action: action.to_string(),
        target_type: target_type.to_string(),
        target_id: target_id.to_string(),
        payload,
        created_at: now,
    };
    let _ = store.append_admin_audit(&entry);
}
