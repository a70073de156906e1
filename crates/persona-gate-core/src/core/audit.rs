// persona-gate-core/src/core/audit.rs
// ============================================================================
// Module: Persona Gate Audit Records
// Description: Control-plane and tool-call audit rows.
// Purpose: Keep an append-only trail of every privileged action and tool call.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Two append-only audit trails exist beside the trace ledger: the admin
//! audit log for control-plane actions (policy create, release activate,
//! feedback triage) and the tool-call audit for every tool invocation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::Scope;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Admin Audit
// ============================================================================

/// Append-only record of one control-plane action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAuditEntry {
    /// Row identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Operator who performed the action.
    pub actor: String,
    /// Action label (for example `release.activate`, `policy.rollback`).
    pub action: String,
    /// Kind of record acted on.
    pub target_type: String,
    /// Identifier of the record acted on.
    pub target_id: String,
    /// Action payload for replay.
    pub payload: Value,
    /// Action timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Tool Call Audit
// ============================================================================

/// Terminal status of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Call completed and returned output.
    Success,
    /// Call failed with a classified error.
    Failed,
    /// Call exceeded its per-tool timeout.
    Timeout,
}

impl ToolCallStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row produced by every tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallAudit {
    /// Row identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Trace the call ran under.
    pub trace_id: TraceId,
    /// Tool name invoked.
    pub tool_name: String,
    /// Terminal status.
    pub status: ToolCallStatus,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
    /// Canonical hash of the request payload.
    pub request_payload_hash: String,
    /// Classified error label when failed.
    pub error_type: Option<String>,
    /// Attempt count including retries.
    pub attempts: u32,
    /// Call timestamp.
    pub created_at: Timestamp,
}
