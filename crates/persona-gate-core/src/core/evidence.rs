// persona-gate-core/src/core/evidence.rs
// ============================================================================
// Module: Persona Gate Evidence Model
// Description: Citable evidence units and retrieval citations.
// Purpose: Carry the grounded excerpts the evidence gate reasons over.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Evidence rows are content-addressed citable units. The body is immutable
//! after creation; only the `verified` flag and vector bookkeeping fields may
//! change. Retrieval returns [`Citation`]s, which pair an evidence reference
//! with a strategy score.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Content-addressed citable evidence unit.
///
/// # Invariants
/// - Body fields are immutable after creation; `verified`,
///   `vector_updated_at`, and `vector_hash` are the only mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence identifier.
    pub id: EvidenceId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Kind of source (document, interview, archive).
    pub source_type: String,
    /// Reference locating the source (citation string or URI).
    pub source_ref: String,
    /// Title of the excerpted source.
    pub title: String,
    /// Citable excerpt body.
    pub excerpt: String,
    /// Editorial confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the excerpt has been editorially verified.
    pub verified: bool,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Knowledge domains the excerpt belongs to.
    pub domains: Vec<String>,
    /// When the embedding vector was last synced.
    pub vector_updated_at: Option<Timestamp>,
    /// Content hash of the vectorized text.
    pub vector_hash: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Citation
// ============================================================================

/// Evidence reference returned by retrieval, ranked by strategy score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited evidence identifier.
    pub evidence_id: EvidenceId,
    /// Source title.
    pub title: String,
    /// Excerpt presented to the model.
    pub excerpt: String,
    /// Retrieval score in `[0, 1]` after normalisation.
    pub score: f64,
    /// Editorial confidence carried from the evidence row.
    pub confidence: f64,
    /// Verified flag carried from the evidence row.
    pub verified: bool,
}

// ============================================================================
// SECTION: Evidence Query
// ============================================================================

/// Query the orchestrator hands to a retrieval provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceQuery {
    /// User query text.
    pub query: String,
    /// Knowledge domains to filter to (empty means all).
    pub domains: Vec<String>,
    /// Maximum citations to return.
    pub top_k: usize,
    /// Minimum strategy score to include.
    pub min_score: f64,
}
