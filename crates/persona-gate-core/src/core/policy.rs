// persona-gate-core/src/core/policy.rs
// ============================================================================
// Module: Persona Gate Evidence-Gate Policy Model
// Description: Versioned per-tenant evidence-gate policy rules.
// Purpose: Express the thresholds the gate evaluator decides with.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An evidence-gate policy is a versioned set of intent rules plus per-site
//! and per-npc overrides. Exactly one version per policy name is active at a
//! time; the active version string is stamped into every trace that used it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::intent::Intent;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Policy Mode
// ============================================================================

/// Answer mode decided by the evidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Evidence is sufficient; answer normally.
    Normal,
    /// Evidence is insufficient; answer with a conservative template.
    Conservative,
    /// Topic is sensitive or forbidden; refuse.
    Refuse,
}

impl PolicyMode {
    /// Returns the stable wire label for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Conservative => "conservative",
            Self::Refuse => "refuse",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Evidence thresholds applied to one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    /// Intent this rule applies to.
    pub intent: Intent,
    /// Minimum number of qualifying citations.
    pub min_evidence_count: u32,
    /// Minimum citation confidence to qualify.
    pub min_confidence: f64,
    /// Whether history-related queries additionally require a verified citation.
    pub require_verified: bool,
    /// Soft claims the model may make without direct evidence.
    #[serde(default)]
    pub allowed_soft_claims: Vec<String>,
}

/// Partial rule overlay applied on top of a matched intent rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOverride {
    /// Overrides the minimum qualifying citation count.
    #[serde(default)]
    pub min_evidence_count: Option<u32>,
    /// Overrides the minimum qualifying confidence.
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Overrides the verified-evidence requirement.
    #[serde(default)]
    pub require_verified: Option<bool>,
}

impl RuleOverride {
    /// Returns whether the override changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min_evidence_count.is_none()
            && self.min_confidence.is_none()
            && self.require_verified.is_none()
    }

    /// Applies this overlay to a base rule.
    #[must_use]
    pub fn apply_to(&self, base: &IntentRule) -> IntentRule {
        IntentRule {
            intent: base.intent,
            min_evidence_count: self.min_evidence_count.unwrap_or(base.min_evidence_count),
            min_confidence: self.min_confidence.unwrap_or(base.min_confidence),
            require_verified: self.require_verified.unwrap_or(base.require_verified),
            allowed_soft_claims: base.allowed_soft_claims.clone(),
        }
    }
}

/// Per-site and per-npc rule overlays keyed by identifier string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    /// Overrides keyed by site identifier.
    #[serde(default)]
    pub per_site: BTreeMap<String, RuleOverride>,
    /// Overrides keyed by NPC identifier.
    #[serde(default)]
    pub per_npc: BTreeMap<String, RuleOverride>,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Versioned evidence-gate policy.
///
/// # Invariants
/// - At most one active version per policy name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// Policy name (one logical policy per name).
    pub name: String,
    /// Version string stamped into traces (for example `v1.2`).
    pub version: String,
    /// Whether this version is the active one.
    pub is_active: bool,
    /// Rules keyed by intent; a match short-circuits.
    pub intent_rules: Vec<IntentRule>,
    /// Rule applied when no intent rule matches.
    pub default_rule: IntentRule,
    /// Per-site and per-npc overlays.
    #[serde(default)]
    pub overrides: PolicyOverrides,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

impl GatePolicy {
    /// Returns the rule registered for the given intent, if any.
    #[must_use]
    pub fn rule_for_intent(&self, intent: Intent) -> Option<&IntentRule> {
        self.intent_rules.iter().find(|rule| rule.intent == intent)
    }
}

// ============================================================================
// SECTION: Applied Rule
// ============================================================================

/// Layer of the policy that decided a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// A per-npc override decided.
    NpcOverride,
    /// A per-site override decided.
    SiteOverride,
    /// An intent rule matched.
    Intent,
    /// The default rule applied.
    Default,
}

/// Audit record of the rule the gate applied to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    /// Stable rule identifier (for example `npc:ancestor_yan`).
    pub rule_id: String,
    /// Layer the rule came from.
    pub source: RuleSource,
    /// Effective thresholds after overlays.
    pub effective: IntentRule,
}
