// persona-gate-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Invariant coverage for the durable store.
// ============================================================================
//! ## Overview
//! Validates the schema-enforced invariants: single active row per scope,
//! idempotent assignment insertion, unique trace commit, alert dedup, and
//! the activate/rollback round-trip with history rows.

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

use persona_gate_core::AlertCondition;
use persona_gate_core::AlertEvent;
use persona_gate_core::AlertSeverity;
use persona_gate_core::AlertStatus;
use persona_gate_core::AlertStore;
use persona_gate_core::CatalogStore;
use persona_gate_core::ExperimentAssignment;
use persona_gate_core::ExperimentId;
use persona_gate_core::ExperimentStore;
use persona_gate_core::Feedback;
use persona_gate_core::FeedbackId;
use persona_gate_core::FeedbackSeverity;
use persona_gate_core::FeedbackStatus;
use persona_gate_core::FeedbackStore;
use persona_gate_core::FeedbackType;
use persona_gate_core::GatePolicy;
use persona_gate_core::Intent;
use persona_gate_core::IntentRule;
use persona_gate_core::NpcId;
use persona_gate_core::NpcProfile;
use persona_gate_core::PolicyMode;
use persona_gate_core::PolicyOverrides;
use persona_gate_core::PolicyStore;
use persona_gate_core::Release;
use persona_gate_core::ReleaseAction;
use persona_gate_core::ReleaseId;
use persona_gate_core::ReleasePayload;
use persona_gate_core::ReleaseStatus;
use persona_gate_core::ReleaseStore;
use persona_gate_core::RetrievalDefaults;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::StoreError;
use persona_gate_core::StrategyOverrides;
use persona_gate_core::SubjectType;
use persona_gate_core::TenantId;
use persona_gate_core::TimeAwareness;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use persona_gate_core::TraceRecord;
use persona_gate_core::TraceStatus;
use persona_gate_core::TraceStore;
use persona_gate_core::alert_dedup_key;
use persona_gate_store_sqlite::SqliteStore;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Timestamp shorthand.
const fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

/// Standard test scope.
fn scope() -> Scope {
    Scope::new("tenant-a", "main")
}

/// Builds a draft release.
fn release(id: &str) -> Release {
    Release {
        id: ReleaseId::new(id),
        scope: scope(),
        name: format!("release {id}"),
        description: None,
        status: ReleaseStatus::Draft,
        payload: ReleasePayload {
            policy_version: "v1.0".to_string(),
            prompts_active: std::collections::BTreeMap::new(),
            experiment_id: None,
            retrieval_defaults: RetrievalDefaults::default(),
        },
        created_by: "operator".to_string(),
        created_at: at(0),
        activated_at: None,
        archived_at: None,
    }
}

/// Builds a policy version.
fn policy(version: &str, active: bool) -> GatePolicy {
    GatePolicy {
        name: "evidence-gate".to_string(),
        version: version.to_string(),
        is_active: active,
        intent_rules: Vec::new(),
        default_rule: IntentRule {
            intent: Intent::Unknown,
            min_evidence_count: 1,
            min_confidence: 0.5,
            require_verified: false,
            allowed_soft_claims: Vec::new(),
        },
        overrides: PolicyOverrides::default(),
        created_at: at(0),
    }
}

/// Builds a minimal trace record.
fn trace(id: &str) -> TraceRecord {
    TraceRecord {
        trace_id: TraceId::new(id),
        scope: scope(),
        session_id: SessionId::new("sess-1"),
        user_id: None,
        npc_id: None,
        request_type: "chat".to_string(),
        request_input: json!({}),
        tool_calls: Vec::new(),
        evidence_ids: Vec::new(),
        evidence_chain: json!([]),
        policy_mode: PolicyMode::Normal,
        policy_reason: None,
        applied_rule_id: None,
        policy_version: None,
        response_output: None,
        model_provider: None,
        model_name: None,
        latency_ms: Some(10),
        tokens: None,
        cost_usd: None,
        guardrail_passed: Some(true),
        release_id: None,
        experiment_id: None,
        experiment_variant: None,
        strategy_snapshot: json!({}),
        status: TraceStatus::Success,
        error: None,
        started_at: at(1_000),
        completed_at: Some(at(1_010)),
        metadata: json!({}),
    }
}

// ============================================================================
// SECTION: Release Invariants
// ============================================================================

/// Activation archives the previous active bundle and records history.
#[test]
fn activate_then_rollback_round_trip() {
    let store = SqliteStore::in_memory().unwrap();
    let first = release("rel-1");
    let second = release("rel-2");
    store.insert_release(&first).unwrap();
    store.insert_release(&second).unwrap();

    store.swap_active(&first.id, ReleaseAction::Activate, "op", at(10)).unwrap();
    let active = store.active_release(&scope()).unwrap().unwrap();
    assert_eq!(active.id, first.id);

    store.swap_active(&second.id, ReleaseAction::Activate, "op", at(20)).unwrap();
    let active = store.active_release(&scope()).unwrap().unwrap();
    assert_eq!(active.id, second.id);
    let archived = store.release(&first.id).unwrap().unwrap();
    assert_eq!(archived.status, ReleaseStatus::Archived);

    // Rollback swaps the archived bundle back in.
    store.swap_active(&first.id, ReleaseAction::Rollback, "op", at(30)).unwrap();
    let active = store.active_release(&scope()).unwrap().unwrap();
    assert_eq!(active.id, first.id);

    let history = store.release_history(&first.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, ReleaseAction::Rollback);
    assert_eq!(history[0].previous_release_id, Some(second.id.clone()));
    assert_eq!(history[1].action, ReleaseAction::Activate);
}

/// Activating a non-draft release is a conflict.
#[test]
fn activate_requires_draft_status() {
    let store = SqliteStore::in_memory().unwrap();
    let bundle = release("rel-1");
    store.insert_release(&bundle).unwrap();
    store.swap_active(&bundle.id, ReleaseAction::Activate, "op", at(10)).unwrap();
    let err = store.swap_active(&bundle.id, ReleaseAction::Activate, "op", at(20)).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

// ============================================================================
// SECTION: Policy Invariants
// ============================================================================

/// At most one version per name is active.
#[test]
fn single_active_policy_per_name() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_policy(&policy("v1.0", true)).unwrap();
    store.insert_policy(&policy("v1.1", true)).unwrap();
    let active = store.active_policy("evidence-gate").unwrap().unwrap();
    assert_eq!(active.version, "v1.1");

    let rolled_back = store.set_active_policy("evidence-gate", "v1.0").unwrap();
    assert_eq!(rolled_back.version, "v1.0");
    let active = store.active_policy("evidence-gate").unwrap().unwrap();
    assert_eq!(active.version, "v1.0");

    let missing = store.set_active_policy("evidence-gate", "v9.9");
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

/// Duplicate versions are rejected as conflicts.
#[test]
fn duplicate_policy_version_conflicts() {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_policy(&policy("v1.0", true)).unwrap();
    let err = store.insert_policy(&policy("v1.0", false)).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

// ============================================================================
// SECTION: Assignment Idempotency
// ============================================================================

/// The first writer wins; later writers read the same row.
#[test]
fn assignment_insert_is_idempotent() {
    let store = SqliteStore::in_memory().unwrap();
    let assignment = ExperimentAssignment {
        experiment_id: ExperimentId::new("exp-1"),
        scope: scope(),
        subject_type: SubjectType::SessionId,
        subject_key: "S1".to_string(),
        variant: "control".to_string(),
        bucket_hash: 17,
        strategy_overrides: StrategyOverrides::default(),
        assigned_at: at(10),
    };
    assert!(store.try_insert_assignment(&assignment).unwrap());

    let racing = ExperimentAssignment {
        variant: "treatment".to_string(),
        ..assignment.clone()
    };
    assert!(!store.try_insert_assignment(&racing).unwrap());

    let stored = store.assignment(&assignment.experiment_id, "S1").unwrap().unwrap();
    assert_eq!(stored.variant, "control");
}

// ============================================================================
// SECTION: Trace Ledger
// ============================================================================

/// Trace ids are unique; a second commit conflicts.
#[test]
fn trace_commit_is_unique() {
    let store = SqliteStore::in_memory().unwrap();
    store.commit_turn(&trace("tr-1"), None).unwrap();
    let err = store.commit_turn(&trace("tr-1"), None).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    let loaded = store.trace_by_id(&TraceId::new("tr-1")).unwrap().unwrap();
    assert_eq!(loaded.latency_ms, Some(10));
}

// ============================================================================
// SECTION: Alert Dedup
// ============================================================================

/// Two firings share one row; the second only touches `last_seen_at`.
#[test]
fn alert_dedup_single_firing_row() {
    let store = SqliteStore::in_memory().unwrap();
    let tenant = TenantId::new("tenant-a");
    let dedup = alert_dedup_key(&tenant, None, "high_fallback_rate");
    let event = AlertEvent {
        id: "evt-1".to_string(),
        tenant_id: tenant.clone(),
        site_id: None,
        alert_code: "high_fallback_rate".to_string(),
        severity: AlertSeverity::High,
        status: AlertStatus::Firing,
        window: "15m".to_string(),
        current_value: 0.4,
        threshold: 0.3,
        condition: AlertCondition::GreaterThan,
        unit: None,
        dedup_key: dedup.clone(),
        first_seen_at: at(100),
        last_seen_at: at(100),
        resolved_at: None,
        context: json!({}),
        webhook_sent: false,
        webhook_sent_at: None,
    };
    store.insert_event(&event).unwrap();

    // A second insert for the same dedup key conflicts.
    let duplicate = AlertEvent {
        id: "evt-2".to_string(),
        ..event.clone()
    };
    assert!(matches!(store.insert_event(&duplicate), Err(StoreError::Conflict(_))));

    store.touch_event(&dedup, 0.5, at(200)).unwrap();
    let firing = store.firing_event(&dedup).unwrap().unwrap();
    assert_eq!(firing.id, "evt-1");
    assert_eq!(firing.last_seen_at, at(200));
    assert!((firing.current_value - 0.5).abs() < f64::EPSILON);
    assert_eq!(firing.first_seen_at, at(100));

    assert!(store.resolve_event(&dedup, at(300)).unwrap());
    assert!(store.firing_event(&dedup).unwrap().is_none());
    // A fresh firing may start a new row after resolution.
    store.insert_event(&duplicate).unwrap();
}

// ============================================================================
// SECTION: Feedback and Profiles
// ============================================================================

/// The overdue scan picks up open tickets past their deadline exactly once.
#[test]
fn overdue_scan_marks_once() {
    let store = SqliteStore::in_memory().unwrap();
    let ticket = Feedback {
        id: FeedbackId::new("fb-1"),
        scope: scope(),
        trace_id: None,
        npc_id: None,
        feedback_type: FeedbackType::Correction,
        severity: FeedbackSeverity::Medium,
        content: "wrong date".to_string(),
        status: FeedbackStatus::Pending,
        assignee: None,
        group: Some("support".to_string()),
        matched_rule_id: None,
        sla_due_at: Some(at(1_000)),
        overdue_flag: false,
        triaged_at: None,
        in_progress_at: None,
        closed_at: None,
        resolved_by_content_id: None,
        resolved_by_evidence_id: None,
        resolved_by: None,
        resolution_notes: None,
        created_at: at(0),
        updated_at: at(0),
    };
    store.insert_feedback(&ticket).unwrap();

    assert!(store.overdue_candidates(at(500)).unwrap().is_empty());
    let candidates = store.overdue_candidates(at(2_000)).unwrap();
    assert_eq!(candidates.len(), 1);

    let marked = store.mark_overdue(&[ticket.id.clone()], at(2_000)).unwrap();
    assert_eq!(marked, 1);
    assert!(store.overdue_candidates(at(2_000)).unwrap().is_empty());
    let reloaded = store.feedback(&ticket.id).unwrap().unwrap();
    assert!(reloaded.overdue_flag);
}

/// Saving a new active profile version deactivates the previous one.
#[test]
fn single_active_profile_per_npc() {
    let store = SqliteStore::in_memory().unwrap();
    let npc = NpcId::new("elder");
    let mut profile = NpcProfile {
        npc_id: npc.clone(),
        scope: scope(),
        version: 1,
        active: true,
        display_name: "Village Elder".to_string(),
        persona: "keeper of local lore".to_string(),
        knowledge_domains: vec!["history".to_string()],
        forbidden_topics: Vec::new(),
        greeting_templates: vec!["Welcome, traveller.".to_string()],
        fallback_responses: vec!["I am not certain of that.".to_string()],
        must_cite_sources: true,
        time_awareness: TimeAwareness::Historical,
        created_at: at(0),
    };
    store.upsert_profile(&profile).unwrap();

    profile.version = 2;
    profile.persona = "keeper of local lore, revised".to_string();
    store.upsert_profile(&profile).unwrap();

    let active = store.active_profile(&scope(), &npc).unwrap().unwrap();
    assert_eq!(active.version, 2);
}
