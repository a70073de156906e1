// persona-gate-core/src/core/usage.rs
// ============================================================================
// Module: Persona Gate Embedding Usage
// Description: Per-call embedding audit records.
// Purpose: Account for embedding spend and dedup effectiveness.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every embedding call records provider, model, dimensions, input size,
//! estimated cost, and outcome. Dedup hits are recorded too so coverage
//! reports can distinguish cached from fresh vectorization.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Outcome of one embedding call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingCallStatus {
    /// Embedding computed.
    Success,
    /// Provider call failed.
    Failed,
    /// Provider rate limited the call.
    RateLimited,
    /// Content hash matched; no provider call was made.
    DedupHit,
}

impl EmbeddingCallStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
            Self::DedupHit => "dedup_hit",
        }
    }
}

impl fmt::Display for EmbeddingCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Usage Record
// ============================================================================

/// Audit row for one embedding call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    /// Row identifier.
    pub id: String,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Kind of object embedded (`evidence`, `content`, `query`).
    pub object_type: String,
    /// Identifier of the object embedded.
    pub object_id: String,
    /// Embedding provider name.
    pub provider: String,
    /// Embedding model name.
    pub model: String,
    /// Vector dimension produced.
    pub embedding_dim: u32,
    /// Characters submitted.
    pub input_chars: u32,
    /// Estimated tokens consumed.
    pub estimated_tokens: u32,
    /// Estimated cost in USD.
    pub cost_estimate: f64,
    /// Call latency in milliseconds.
    pub latency_ms: u64,
    /// Call outcome.
    pub status: EmbeddingCallStatus,
    /// Content hash used for dedup.
    pub content_hash: String,
    /// Call timestamp.
    pub created_at: Timestamp,
}
