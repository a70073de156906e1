// persona-gate-core/src/core/trace.rs
// ============================================================================
// Module: Persona Gate Trace Ledger Model
// Description: Immutable per-turn trace records.
// Purpose: Make every answer auditable end to end.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! One trace row is written per turn, covering inputs, tool calls, evidence,
//! policy decision, model usage, latency, cost, and experiment attribution.
//! Rows are append-only once `completed_at` is set; corrections reference the
//! original trace id in metadata rather than mutating the row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::ExperimentId;
use crate::core::identifiers::NpcId;
use crate::core::identifiers::ReleaseId;
use crate::core::identifiers::Scope;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TraceId;
use crate::core::identifiers::UserId;
use crate::core::policy::PolicyMode;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// Turn completed and a response was returned.
    Success,
    /// Turn failed; a fallback sentence was returned.
    Failed,
    /// Turn exceeded its deadline; a truncated trace was persisted.
    Timeout,
}

impl TraceStatus {
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

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tool Calls and Tokens
// ============================================================================

/// Outcome of one tool invocation within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name invoked.
    pub tool_name: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
    /// Classified error label when failed.
    pub error_type: Option<String>,
    /// Canonical hash of the request payload.
    pub request_payload_hash: Option<String>,
}

/// Token accounting for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Returns the total tokens for the call.
    #[must_use]
    pub const fn total(self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

// ============================================================================
// SECTION: Trace Record
// ============================================================================

/// Immutable per-turn trace record.
///
/// # Invariants
/// - `trace_id` is globally unique.
/// - `completed_at >= started_at` whenever both are present, and
///   `latency_ms` equals their difference.
/// - The record is append-only after `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Trace identifier.
    pub trace_id: TraceId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// End user, when known.
    pub user_id: Option<UserId>,
    /// NPC answering the turn.
    pub npc_id: Option<NpcId>,
    /// Request kind (`chat`, `greeting`).
    pub request_type: String,
    /// Request payload as received.
    pub request_input: Value,
    /// Tool calls issued during the turn.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Evidence cited by the answer.
    pub evidence_ids: Vec<EvidenceId>,
    /// Full evidence chain (citations with scores) for replay.
    pub evidence_chain: Value,
    /// Policy mode the gate decided.
    pub policy_mode: PolicyMode,
    /// Machine-readable gate reason.
    pub policy_reason: Option<String>,
    /// Identifier of the policy rule that decided.
    pub applied_rule_id: Option<String>,
    /// Policy version that decided.
    pub policy_version: Option<String>,
    /// Response payload returned to the caller.
    pub response_output: Option<Value>,
    /// Model provider used.
    pub model_provider: Option<String>,
    /// Model name used.
    pub model_name: Option<String>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: Option<u64>,
    /// Token usage for the model call.
    pub tokens: Option<TokenUsage>,
    /// Estimated cost in USD.
    pub cost_usd: Option<f64>,
    /// Whether the output validator passed the answer unchanged.
    pub guardrail_passed: Option<bool>,
    /// Release active while the turn ran.
    pub release_id: Option<ReleaseId>,
    /// Experiment the turn was attributed to.
    pub experiment_id: Option<ExperimentId>,
    /// Variant the subject was bucketed into.
    pub experiment_variant: Option<String>,
    /// Snapshot of the effective strategy dials.
    pub strategy_snapshot: Value,
    /// Terminal status of the turn.
    pub status: TraceStatus,
    /// Error description when failed.
    pub error: Option<String>,
    /// Turn start timestamp.
    pub started_at: Timestamp,
    /// Turn completion timestamp.
    pub completed_at: Option<Timestamp>,
    /// Free-form metadata; corrections reference the prior trace id here.
    pub metadata: Value,
}

impl TraceRecord {
    /// Marks the record complete, computing latency from the timestamps.
    pub fn complete(&mut self, status: TraceStatus, now: Timestamp) {
        self.status = status;
        self.completed_at = Some(now);
        self.latency_ms = Some(now.saturating_millis_since(self.started_at));
    }

    /// Marks the record failed with an error description.
    pub fn fail(&mut self, error: impl Into<String>, now: Timestamp) {
        self.error = Some(error.into());
        self.complete(TraceStatus::Failed, now);
    }
}
