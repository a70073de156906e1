// persona-gate-core/src/runtime/gate.rs
// ============================================================================
// Module: Persona Gate Evidence Gate
// Description: Evidence-gate decision procedure over policy rules.
// Purpose: Downgrade answers lacking grounded support deterministically.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The gate evaluator resolves the applicable rule for a turn (per-npc
//! override, then per-site override, then intent match, then default),
//! counts qualifying citations, and decides the policy mode. Sensitive
//! intents refuse outright; insufficient evidence downgrades to
//! conservative; everything else answers normally. Every decision records
//! the rule and policy version that produced it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::evidence::Citation;
use crate::core::identifiers::NpcId;
use crate::core::identifiers::SiteId;
use crate::core::intent::Intent;
use crate::core::policy::AppliedRule;
use crate::core::policy::GatePolicy;
use crate::core::policy::PolicyMode;
use crate::core::policy::RuleOverride;
use crate::core::policy::RuleSource;

// ============================================================================
// SECTION: Gate Input
// ============================================================================

/// Inputs to one gate evaluation.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    /// Classified intent for the turn.
    pub intent: Intent,
    /// Whether the query is history-related.
    pub history_related: bool,
    /// Citations retrieval returned for the turn.
    pub citations: &'a [Citation],
    /// NPC answering the turn.
    pub npc_id: &'a NpcId,
    /// Site the turn runs in.
    pub site_id: &'a SiteId,
    /// Experiment variant overlay folded into the thresholds, if any.
    pub experiment_override: Option<&'a RuleOverride>,
}

// ============================================================================
// SECTION: Gate Decision
// ============================================================================

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Decided policy mode.
    pub mode: PolicyMode,
    /// Machine-readable reason label.
    pub reason: String,
    /// Rule that decided, with effective thresholds.
    pub applied_rule: AppliedRule,
    /// Policy version that decided.
    pub policy_version: String,
    /// Citations required by the effective rule.
    pub need_evidence: u32,
    /// Citations that qualified.
    pub have_evidence: u32,
    /// Whether a verified citation was additionally required.
    pub verified_required: bool,
}

impl GateDecision {
    /// Returns whether the turn may cite evidence in its answer.
    #[must_use]
    pub const fn allows_citations(&self) -> bool {
        matches!(self.mode, PolicyMode::Normal)
    }
}

// ============================================================================
// SECTION: Gate Evaluator
// ============================================================================

/// Evaluates the evidence gate against a policy snapshot.
pub struct GateEvaluator {
    /// Policy snapshot the evaluator decides with.
    policy: GatePolicy,
}

impl GateEvaluator {
    /// Creates an evaluator over a policy snapshot.
    #[must_use]
    pub const fn new(policy: GatePolicy) -> Self {
        Self {
            policy,
        }
    }

    /// Returns the policy version this evaluator decides with.
    #[must_use]
    pub fn policy_version(&self) -> &str {
        &self.policy.version
    }

    /// Evaluates one turn.
    #[must_use]
    pub fn evaluate(&self, input: &GateInput<'_>) -> GateDecision {
        let applied = self.resolve_rule(input);
        let rule = &applied.effective;

        if input.intent == Intent::Sensitive {
            return GateDecision {
                mode: PolicyMode::Refuse,
                reason: "sensitive_intent".to_string(),
                need_evidence: rule.min_evidence_count,
                have_evidence: 0,
                verified_required: false,
                policy_version: self.policy.version.clone(),
                applied_rule: applied,
            };
        }

        let have = qualifying_citations(input.citations, rule.min_confidence);
        let verified_required = rule.require_verified && input.history_related;
        let has_verified = input.citations.iter().any(|citation| citation.verified);

        let (mode, reason) = if have < rule.min_evidence_count {
            (PolicyMode::Conservative, "insufficient_evidence".to_string())
        } else if verified_required && !has_verified {
            (PolicyMode::Conservative, "history_requires_verified_evidence".to_string())
        } else {
            (PolicyMode::Normal, "evidence_sufficient".to_string())
        };

        GateDecision {
            mode,
            reason,
            need_evidence: rule.min_evidence_count,
            have_evidence: have,
            verified_required,
            policy_version: self.policy.version.clone(),
            applied_rule: applied,
        }
    }

    /// Resolves the applicable rule for a turn.
    ///
    /// The base rule is the intent match (or the default rule); site and npc
    /// overlays apply on top, most specific last, and the applied-rule id
    /// names the most specific layer that changed anything.
    fn resolve_rule(&self, input: &GateInput<'_>) -> AppliedRule {
        let (mut effective, mut rule_id, mut source) =
            self.policy.rule_for_intent(input.intent).map_or_else(
                || (self.policy.default_rule.clone(), "default".to_string(), RuleSource::Default),
                |rule| {
                    (rule.clone(), format!("intent:{}", rule.intent), RuleSource::Intent)
                },
            );

        if let Some(overlay) = self.policy.overrides.per_site.get(input.site_id.as_str())
            && !overlay.is_empty()
        {
            effective = overlay.apply_to(&effective);
            rule_id = format!("site:{}", input.site_id);
            source = RuleSource::SiteOverride;
        }

        if let Some(overlay) = self.policy.overrides.per_npc.get(input.npc_id.as_str())
            && !overlay.is_empty()
        {
            effective = overlay.apply_to(&effective);
            rule_id = format!("npc:{}", input.npc_id);
            source = RuleSource::NpcOverride;
        }

        if let Some(overlay) = input.experiment_override
            && !overlay.is_empty()
        {
            effective = overlay.apply_to(&effective);
        }

        AppliedRule {
            rule_id,
            source,
            effective,
        }
    }
}

/// Counts citations meeting the confidence threshold.
fn qualifying_citations(citations: &[Citation], min_confidence: f64) -> u32 {
    let count = citations.iter().filter(|citation| citation.confidence >= min_confidence).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
