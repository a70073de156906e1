// persona-gate-tools/src/schemas.rs
// ============================================================================
// Module: Tool Request and Response Schemas
// Description: Typed payloads for the built-in tools.
// Purpose: Keep tool payloads typed at both ends of the RPC plane.
// Dependencies: persona-gate-core, serde
// ============================================================================

//! ## Overview
//! Each built-in tool has a typed input and output pair. The wire carries
//! JSON validated against the registry's schemas; these types are the
//! in-process view of the same payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_core::Citation;
use persona_gate_core::NpcProfile;
use persona_gate_core::NpcPrompt;
use persona_gate_core::SiteMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: NPC Profile
// ============================================================================

/// Input of `get_npc_profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNpcProfileInput {
    /// NPC identifier.
    pub npc_id: String,
}

/// Output of `get_npc_profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetNpcProfileOutput {
    /// Active profile version.
    pub profile: NpcProfile,
}

// ============================================================================
// SECTION: Active Prompt
// ============================================================================

/// Input of `get_prompt_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptActiveInput {
    /// NPC identifier.
    pub npc_id: String,
    /// Specific version pinned by the active release, when set.
    #[serde(default)]
    pub version: Option<u32>,
}

/// Output of `get_prompt_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptActiveOutput {
    /// Resolved prompt version.
    pub prompt: NpcPrompt,
}

// ============================================================================
// SECTION: Site Map
// ============================================================================

/// Input of `get_site_map`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSiteMapInput {}

/// Output of `get_site_map`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSiteMapOutput {
    /// Site map document.
    pub site_map: SiteMap,
}

// ============================================================================
// SECTION: Content Search
// ============================================================================

/// Input of `search_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchContentInput {
    /// Search keyword.
    pub keyword: String,
    /// Restricts to one content type, when set.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Requires at least one of these tags, when non-empty.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Maximum results.
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Default result cap for content search.
const fn default_search_limit() -> usize {
    20
}

/// One content search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentHit {
    /// Content identifier.
    pub id: String,
    /// Item title.
    pub title: String,
    /// Item kind.
    pub content_type: String,
    /// Editorial credibility score.
    pub credibility_score: f64,
    /// Lifecycle state label.
    pub lifecycle: String,
}

/// Output of `search_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchContentOutput {
    /// Matching items.
    pub results: Vec<ContentHit>,
}

// ============================================================================
// SECTION: Evidence Retrieval
// ============================================================================

/// Input of `retrieve_evidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveEvidenceInput {
    /// Query text.
    pub query: String,
    /// Knowledge domains to filter to.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Maximum citations.
    pub top_k: usize,
    /// Minimum strategy score.
    pub min_score: f64,
}

/// Output of `retrieve_evidence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveEvidenceOutput {
    /// Ranked citations.
    pub citations: Vec<Citation>,
}

// ============================================================================
// SECTION: Draft Content
// ============================================================================

/// Input of `create_draft_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftContentInput {
    /// Item title.
    pub title: String,
    /// Item body.
    pub body: String,
    /// Item kind.
    pub content_type: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Output of `create_draft_content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDraftContentOutput {
    /// Identifier of the created draft.
    pub content_id: String,
}

// ============================================================================
// SECTION: User Events
// ============================================================================

/// Input of `log_user_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogUserEventInput {
    /// Event type label.
    pub event_type: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Value,
}

/// Output of `log_user_event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogUserEventOutput {
    /// Whether the event was appended.
    pub logged: bool,
}
