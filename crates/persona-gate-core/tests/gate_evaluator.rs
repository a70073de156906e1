// persona-gate-core/tests/gate_evaluator.rs
// ============================================================================
// Module: Gate Evaluator Tests
// Description: Tests for evidence-gate decisions over policy rules.
// ============================================================================
//! ## Overview
//! Validates deterministic gate decisions: sensitive refusal, insufficient
//! evidence downgrade, verified-history enforcement, and override layering.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use persona_gate_core::Citation;
use persona_gate_core::EvidenceId;
use persona_gate_core::GateEvaluator;
use persona_gate_core::GateInput;
use persona_gate_core::GatePolicy;
use persona_gate_core::Intent;
use persona_gate_core::IntentRule;
use persona_gate_core::NpcId;
use persona_gate_core::PolicyMode;
use persona_gate_core::PolicyOverrides;
use persona_gate_core::RuleOverride;
use persona_gate_core::RuleSource;
use persona_gate_core::SiteId;
use persona_gate_core::Timestamp;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a rule with the given thresholds.
fn rule(intent: Intent, need: u32, min_confidence: f64, require_verified: bool) -> IntentRule {
    IntentRule {
        intent,
        min_evidence_count: need,
        min_confidence,
        require_verified,
        allowed_soft_claims: Vec::new(),
    }
}

/// Builds a policy requiring two confident citations for fact-seeking turns.
fn policy() -> GatePolicy {
    GatePolicy {
        name: "evidence-gate".to_string(),
        version: "v1.2".to_string(),
        is_active: true,
        intent_rules: vec![
            rule(Intent::FactSeeking, 2, 0.5, true),
            rule(Intent::ContextPreference, 0, 0.0, false),
        ],
        default_rule: rule(Intent::Unknown, 1, 0.5, false),
        overrides: PolicyOverrides::default(),
        created_at: Timestamp::from_unix_millis(0),
    }
}

/// Builds a citation with the given confidence and verification flag.
fn citation(id: &str, confidence: f64, verified: bool) -> Citation {
    Citation {
        evidence_id: EvidenceId::new(id),
        title: format!("source {id}"),
        excerpt: "excerpt".to_string(),
        score: 0.9,
        confidence,
        verified,
    }
}

// ============================================================================
// SECTION: Mode Decisions
// ============================================================================

/// Sensitive intents refuse regardless of the citation set.
#[test]
fn sensitive_intent_refuses() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("ancestor_yan");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.9, true), citation("e2", 0.9, true)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::Sensitive,
        history_related: false,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Refuse);
    assert_eq!(decision.reason, "sensitive_intent");
    assert_eq!(decision.policy_version, "v1.2");
}

/// Zero qualifying citations downgrade a fact-seeking turn to conservative.
#[test]
fn insufficient_evidence_downgrades_to_conservative() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("ancestor_yan");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.2, false)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Conservative);
    assert_eq!(decision.reason, "insufficient_evidence");
    assert_eq!(decision.need_evidence, 2);
    assert_eq!(decision.have_evidence, 0);
    assert_eq!(decision.applied_rule.rule_id, "intent:fact_seeking");
}

/// Confidence below the rule threshold does not qualify a citation.
#[test]
fn low_confidence_citations_do_not_qualify() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("ancestor_yan");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.49, false), citation("e2", 0.9, true)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Conservative);
    assert_eq!(decision.have_evidence, 1);
}

/// History-related turns additionally require a verified citation.
#[test]
fn history_without_verified_evidence_downgrades() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("ancestor_yan");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.8, false), citation("e2", 0.8, false)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: true,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Conservative);
    assert_eq!(decision.reason, "history_requires_verified_evidence");
    assert!(decision.verified_required);
}

/// Sufficient confident evidence answers normally.
#[test]
fn sufficient_evidence_answers_normally() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("ancestor_yan");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.8, true), citation("e2", 0.6, false)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: true,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Normal);
    assert!(decision.allows_citations());
}

// ============================================================================
// SECTION: Override Layering
// ============================================================================

/// A per-npc override relaxes the threshold for that NPC only.
#[test]
fn per_npc_override_wins_over_intent_rule() {
    let mut relaxed = policy();
    relaxed.overrides.per_npc.insert(
        "ancestor_yan".to_string(),
        RuleOverride {
            min_evidence_count: Some(1),
            min_confidence: None,
            require_verified: Some(false),
        },
    );
    let evaluator = GateEvaluator::new(relaxed);
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.8, false)];

    let overridden = NpcId::new("ancestor_yan");
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &overridden,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Normal);
    assert_eq!(decision.applied_rule.rule_id, "npc:ancestor_yan");
    assert_eq!(decision.applied_rule.source, RuleSource::NpcOverride);

    let other = NpcId::new("village_elder");
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &other,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Conservative);
    assert_eq!(decision.applied_rule.rule_id, "intent:fact_seeking");
}

/// A per-site override applies beneath per-npc overlays.
#[test]
fn per_site_override_applies_when_no_npc_override() {
    let mut relaxed = policy();
    relaxed.overrides.per_site.insert(
        "annex".to_string(),
        RuleOverride {
            min_evidence_count: Some(1),
            min_confidence: None,
            require_verified: None,
        },
    );
    let evaluator = GateEvaluator::new(relaxed);
    let npc = NpcId::new("village_elder");
    let site = SiteId::new("annex");
    let citations = vec![citation("e1", 0.8, false)];
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.mode, PolicyMode::Normal);
    assert_eq!(decision.applied_rule.source, RuleSource::SiteOverride);
}

/// Experiment variant overrides fold into the effective thresholds.
#[test]
fn experiment_override_folds_into_thresholds() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("village_elder");
    let site = SiteId::new("main");
    let citations = vec![citation("e1", 0.8, true)];
    let overlay = RuleOverride {
        min_evidence_count: Some(1),
        min_confidence: None,
        require_verified: None,
    };
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::FactSeeking,
        history_related: false,
        citations: &citations,
        npc_id: &npc,
        site_id: &site,
        experiment_override: Some(&overlay),
    });
    assert_eq!(decision.mode, PolicyMode::Normal);
    assert_eq!(decision.applied_rule.effective.min_evidence_count, 1);
}

/// Unknown intents fall back to the default rule.
#[test]
fn unknown_intent_uses_default_rule() {
    let evaluator = GateEvaluator::new(policy());
    let npc = NpcId::new("village_elder");
    let site = SiteId::new("main");
    let decision = evaluator.evaluate(&GateInput {
        intent: Intent::Greeting,
        history_related: false,
        citations: &[],
        npc_id: &npc,
        site_id: &site,
        experiment_override: None,
    });
    assert_eq!(decision.applied_rule.rule_id, "default");
    assert_eq!(decision.applied_rule.source, RuleSource::Default);
}
