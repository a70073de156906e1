// persona-gate-core/src/core/release.rs
// ============================================================================
// Module: Persona Gate Release Model
// Description: Immutable release bundles pinning runtime strategy dials.
// Purpose: Make policy, prompt, and experiment selection atomically switchable.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A release pins the policy version, the active prompt version per NPC, an
//! optional experiment, and the retrieval defaults used at runtime. At most
//! one release is active per `(tenant, site)`; activation archives the
//! previous active bundle and is linearised per scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::experiment::StrategyOverrides;
use crate::core::identifiers::ExperimentId;
use crate::core::identifiers::ReleaseId;
use crate::core::identifiers::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Retrieval Strategy
// ============================================================================

/// Retrieval strategy selectable from release defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Trigram similarity over title and excerpt.
    Trgm,
    /// Cosine similarity over embedded queries.
    Qdrant,
    /// Weighted fusion of trigram and vector scores.
    #[default]
    Hybrid,
}

impl RetrievalStrategy {
    /// Returns the stable wire label for this strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trgm => "trgm",
            Self::Qdrant => "qdrant",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Retrieval Defaults
// ============================================================================

/// Retrieval dials pinned by a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDefaults {
    /// Strategy the retrieval provider runs.
    pub strategy: RetrievalStrategy,
    /// Maximum citations returned per turn.
    pub top_k: u32,
    /// Minimum strategy score to include a citation.
    pub min_score: f64,
    /// Trigram weight used by the hybrid fusion.
    pub trgm_weight: f64,
    /// Vector weight used by the hybrid fusion.
    pub qdrant_weight: f64,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Hybrid,
            top_k: 5,
            min_score: 0.3,
            trgm_weight: 0.4,
            qdrant_weight: 0.6,
        }
    }
}

impl RetrievalDefaults {
    /// Folds experiment variant overrides into these defaults.
    #[must_use]
    pub fn merged_with(&self, overrides: &StrategyOverrides) -> Self {
        Self {
            strategy: overrides.strategy.unwrap_or(self.strategy),
            top_k: overrides.top_k.unwrap_or(self.top_k),
            min_score: overrides.min_score.unwrap_or(self.min_score),
            trgm_weight: self.trgm_weight,
            qdrant_weight: self.qdrant_weight,
        }
    }
}

// ============================================================================
// SECTION: Release
// ============================================================================

/// Release lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Authored but not live.
    Draft,
    /// Live; at most one per scope.
    Active,
    /// Superseded; terminal.
    Archived,
}

impl ReleaseStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    /// Returns whether a transition to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active) | (Self::Active, Self::Archived) | (Self::Archived, Self::Active)
        )
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy bundle pinned by a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleasePayload {
    /// Evidence-gate policy version to run.
    pub policy_version: String,
    /// Active prompt version per NPC identifier.
    #[serde(default)]
    pub prompts_active: BTreeMap<String, u32>,
    /// Experiment running under this release, if any.
    #[serde(default)]
    pub experiment_id: Option<ExperimentId>,
    /// Retrieval dials.
    #[serde(default)]
    pub retrieval_defaults: RetrievalDefaults,
}

impl ReleasePayload {
    /// Returns the pinned prompt version for an NPC, if any.
    #[must_use]
    pub fn prompt_version(&self, npc_id: &str) -> Option<u32> {
        self.prompts_active.get(npc_id).copied()
    }
}

/// Immutable release bundle.
///
/// # Invariants
/// - At most one active release per `(tenant, site)`.
/// - `archived` is terminal except through rollback, which re-activates a
///   previously archived bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    /// Release identifier.
    pub id: ReleaseId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Human-readable bundle name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ReleaseStatus,
    /// Pinned strategy bundle.
    pub payload: ReleasePayload,
    /// Operator who authored the bundle.
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Activation timestamp, when active or previously active.
    pub activated_at: Option<Timestamp>,
    /// Archive timestamp, when archived.
    pub archived_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Release History
// ============================================================================

/// Control-plane action recorded in release history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAction {
    /// A draft bundle became active.
    Activate,
    /// A previously archived bundle became active again.
    Rollback,
}

impl ReleaseAction {
    /// Returns the stable wire label for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a release activation or rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseHistory {
    /// History row identifier.
    pub id: String,
    /// Release the action targeted.
    pub release_id: ReleaseId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Action performed.
    pub action: ReleaseAction,
    /// Release that was active before the action, if any.
    pub previous_release_id: Option<ReleaseId>,
    /// Operator who performed the action.
    pub operator: String,
    /// Action timestamp.
    pub created_at: Timestamp,
}
