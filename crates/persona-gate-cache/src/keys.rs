// persona-gate-cache/src/keys.rs
// ============================================================================
// Module: Cache Key Namespace
// Description: Canonical cache key construction and per-resource TTLs.
// Purpose: Keep every cache entry namespaced by tenant and site.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! Cache keys follow `{prefix}:{tenant}:{site}:{resource}:{id}[:suffix]`.
//! Evidence keys fingerprint the query and domain filter so equivalent
//! lookups share an entry. TTLs are fixed per resource type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use persona_gate_core::short_fingerprint;

// ============================================================================
// SECTION: Resources
// ============================================================================

/// Resource types stored in the cache, each with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResource {
    /// Active NPC profile snapshots.
    NpcProfile,
    /// Active NPC prompt snapshots.
    PromptActive,
    /// Site map documents.
    SiteMap,
    /// Evidence retrieval results.
    Evidence,
    /// Generic tool results.
    ToolResult,
    /// Runtime config bundles from the active release.
    RuntimeConfig,
    /// LLM intent classification results.
    IntentResult,
}

impl CacheResource {
    /// Returns the key segment for this resource.
    #[must_use]
    pub const fn segment(self) -> &'static str {
        match self {
            Self::NpcProfile => "npc_profile",
            Self::PromptActive => "prompt",
            Self::SiteMap => "site_map",
            Self::Evidence => "evidence",
            Self::ToolResult => "tool",
            Self::RuntimeConfig => "runtime_config",
            Self::IntentResult => "intent",
        }
    }

    /// Returns the TTL applied to entries of this resource.
    #[must_use]
    pub const fn ttl(self) -> Duration {
        match self {
            // Personas and prompts change rarely.
            Self::NpcProfile | Self::PromptActive | Self::IntentResult => {
                Duration::from_secs(300)
            }
            // Site maps almost never change.
            Self::SiteMap => Duration::from_secs(600),
            // Retrieval results are only briefly reusable.
            Self::Evidence | Self::ToolResult => Duration::from_secs(60),
            Self::RuntimeConfig => Duration::from_secs(60),
        }
    }
}

// ============================================================================
// SECTION: Key Builder
// ============================================================================

/// Builds namespaced cache keys.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    /// Deployment-wide key prefix.
    prefix: String,
}

impl CacheKeyBuilder {
    /// Creates a builder with the given deployment prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Builds a key for a resource and identifier.
    #[must_use]
    pub fn build(
        &self,
        resource: CacheResource,
        scope: &Scope,
        resource_id: &str,
        suffix: Option<&str>,
    ) -> String {
        let mut key = format!(
            "{}:{}:{}:{}:{resource_id}",
            self.prefix,
            scope.tenant_id,
            scope.site_id,
            resource.segment()
        );
        if let Some(suffix) = suffix {
            key.push(':');
            key.push_str(suffix);
        }
        key
    }

    /// Builds the active-profile key for an NPC.
    #[must_use]
    pub fn npc_profile(&self, scope: &Scope, npc_id: &NpcId) -> String {
        self.build(CacheResource::NpcProfile, scope, npc_id.as_str(), None)
    }

    /// Builds the active-prompt key for an NPC.
    #[must_use]
    pub fn prompt_active(&self, scope: &Scope, npc_id: &NpcId) -> String {
        self.build(CacheResource::PromptActive, scope, npc_id.as_str(), Some("active"))
    }

    /// Builds the site map key for a scope.
    #[must_use]
    pub fn site_map(&self, scope: &Scope) -> String {
        self.build(CacheResource::SiteMap, scope, "default", None)
    }

    /// Builds an evidence key from the query fingerprint.
    #[must_use]
    pub fn evidence(&self, scope: &Scope, query: &str, domains: &[String]) -> String {
        let mut sorted = domains.to_vec();
        sorted.sort();
        let joined = sorted.join(",");
        let fingerprint = short_fingerprint(&[query, &joined]);
        self.build(CacheResource::Evidence, scope, &fingerprint, None)
    }

    /// Builds the runtime config key for an NPC within a scope.
    #[must_use]
    pub fn runtime_config(&self, scope: &Scope, npc_id: Option<&NpcId>) -> String {
        let id = npc_id.map_or("", NpcId::as_str);
        self.build(CacheResource::RuntimeConfig, scope, id, None)
    }

    /// Builds the intent cache key from the query and persona fingerprint.
    #[must_use]
    pub fn intent(&self, scope: &Scope, query: &str, persona_summary: &str) -> String {
        let fingerprint = short_fingerprint(&[query, persona_summary]);
        self.build(CacheResource::IntentResult, scope, &fingerprint, None)
    }

    /// Builds the session history key for a session and NPC.
    #[must_use]
    pub fn session_history(&self, scope: &Scope, session_id: &str, npc_id: &NpcId) -> String {
        format!(
            "{}:{}:{}:session:{session_id}:{npc_id}:history",
            self.prefix, scope.tenant_id, scope.site_id
        )
    }
}
