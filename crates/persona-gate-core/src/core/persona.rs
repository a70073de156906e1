// persona-gate-core/src/core/persona.rs
// ============================================================================
// Module: Persona Gate NPC Persona Model
// Description: Versioned NPC profiles and prompt assets.
// Purpose: Carry the persona, constraints, and templates one NPC answers with.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! NPC profiles and prompts are versioned rows with an at-most-one-active
//! invariant per `(tenant, site, npc)`. Profiles carry persona text and
//! answer templates; prompts carry the system prompt asset the pipeline
//! assembles from. Template selection is first-index for reproducibility.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::NpcId;
use crate::core::identifiers::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Time Awareness
// ============================================================================

/// Temporal framing an NPC answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAwareness {
    /// NPC speaks from the present day.
    #[default]
    Modern,
    /// NPC speaks from a historical period; anachronisms are filtered.
    Historical,
}

// ============================================================================
// SECTION: NPC Profile
// ============================================================================

/// Versioned NPC persona configuration.
///
/// # Invariants
/// - At most one active version per `(tenant, site, npc_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcProfile {
    /// NPC identifier.
    pub npc_id: NpcId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Profile version number.
    pub version: u32,
    /// Whether this version is the active one.
    pub active: bool,
    /// Display name shown to end users.
    pub display_name: String,
    /// Persona description used in prompt assembly.
    pub persona: String,
    /// Knowledge domains retrieval is filtered to.
    pub knowledge_domains: Vec<String>,
    /// Topics this NPC must refuse to discuss.
    pub forbidden_topics: Vec<String>,
    /// Greeting templates; the first entry is the canonical greeting.
    pub greeting_templates: Vec<String>,
    /// Conservative fallback responses; the first entry is canonical.
    pub fallback_responses: Vec<String>,
    /// Whether answers must cite retrieved sources.
    pub must_cite_sources: bool,
    /// Temporal framing for anachronism filtering.
    pub time_awareness: TimeAwareness,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

impl NpcProfile {
    /// Returns the canonical greeting template, if any.
    #[must_use]
    pub fn greeting(&self) -> Option<&str> {
        self.greeting_templates.first().map(String::as_str)
    }

    /// Returns the canonical conservative fallback, if any.
    #[must_use]
    pub fn fallback_response(&self) -> Option<&str> {
        self.fallback_responses.first().map(String::as_str)
    }

    /// Returns a short persona summary used in classifier cache keys.
    #[must_use]
    pub fn persona_summary(&self) -> String {
        self.persona.chars().take(200).collect()
    }
}

// ============================================================================
// SECTION: NPC Prompt
// ============================================================================

/// Versioned NPC prompt asset.
///
/// # Invariants
/// - At most one active version per `(tenant, site, npc_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcPrompt {
    /// NPC identifier the prompt belongs to.
    pub npc_id: NpcId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Prompt version number.
    pub version: u32,
    /// Whether this version is the active one.
    pub active: bool,
    /// System prompt body.
    pub content: String,
    /// Free-form metadata (author, review notes).
    pub meta: Value,
    /// Prompt-level policy hints consumed by the assembler.
    pub policy: Value,
    /// Creation timestamp.
    pub created_at: Timestamp,
}
