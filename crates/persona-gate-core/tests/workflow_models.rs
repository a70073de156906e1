// persona-gate-core/tests/workflow_models.rs
// ============================================================================
// Module: Workflow Model Tests
// Description: Feedback lifecycle, routing, and alert model coverage.
// ============================================================================
//! ## Overview
//! Validates the monotonic feedback state machine, first-match routing,
//! alert dedup keys, silence matching, and trace latency bookkeeping.

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
use persona_gate_core::AlertSilence;
use persona_gate_core::AlertStatus;
use persona_gate_core::Feedback;
use persona_gate_core::FeedbackId;
use persona_gate_core::FeedbackSeverity;
use persona_gate_core::FeedbackStatus;
use persona_gate_core::FeedbackType;
use persona_gate_core::PolicyMode;
use persona_gate_core::RoutingAction;
use persona_gate_core::RoutingConditions;
use persona_gate_core::RoutingPolicy;
use persona_gate_core::RoutingRule;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::TenantId;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use persona_gate_core::TraceRecord;
use persona_gate_core::TraceStatus;
use persona_gate_core::alert_dedup_key;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Timestamp shorthand.
const fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

/// Builds a pending ticket.
fn ticket() -> Feedback {
    Feedback {
        id: FeedbackId::new("fb-1"),
        scope: Scope::new("tenant-a", "main"),
        trace_id: None,
        npc_id: None,
        feedback_type: FeedbackType::FactError,
        severity: FeedbackSeverity::High,
        content: "the founding year is wrong".to_string(),
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
    }
}

/// Builds a firing event for silence tests.
fn firing_event() -> AlertEvent {
    AlertEvent {
        id: "evt-1".to_string(),
        tenant_id: TenantId::new("tenant-a"),
        site_id: None,
        alert_code: "high_fallback_rate".to_string(),
        severity: AlertSeverity::High,
        status: AlertStatus::Firing,
        window: "15m".to_string(),
        current_value: 0.42,
        threshold: 0.3,
        condition: AlertCondition::GreaterThan,
        unit: Some("ratio".to_string()),
        dedup_key: alert_dedup_key(&TenantId::new("tenant-a"), None, "high_fallback_rate"),
        first_seen_at: at(100),
        last_seen_at: at(100),
        resolved_at: None,
        context: json!({}),
        webhook_sent: false,
        webhook_sent_at: None,
    }
}

// ============================================================================
// SECTION: Feedback Lifecycle
// ============================================================================

/// The full forward path succeeds and stamps monotonic timestamps.
#[test]
fn feedback_forward_path_is_monotonic() {
    let mut ticket = ticket();
    ticket.triage(at(10)).unwrap();
    assert_eq!(ticket.status, FeedbackStatus::Reviewing);
    ticket.decide(true, at(20)).unwrap();
    assert_eq!(ticket.status, FeedbackStatus::Accepted);
    ticket
        .resolve("editor", Some("content-7".to_string()), None, None, at(30))
        .unwrap();
    assert_eq!(ticket.status, FeedbackStatus::Resolved);
    ticket.archive(at(40)).unwrap();
    assert_eq!(ticket.status, FeedbackStatus::Archived);

    let triaged = ticket.triaged_at.unwrap();
    let in_progress = ticket.in_progress_at.unwrap();
    let closed = ticket.closed_at.unwrap();
    assert!(triaged <= in_progress && in_progress <= closed);
}

/// Backward transitions are rejected.
#[test]
fn feedback_backward_transitions_forbidden() {
    let mut ticket = ticket();
    ticket.triage(at(10)).unwrap();
    ticket.decide(false, at(20)).unwrap();
    assert!(ticket.triage(at(30)).is_err());
    assert!(!FeedbackStatus::Resolved.can_transition_to(FeedbackStatus::Pending));
    assert!(!FeedbackStatus::Archived.can_transition_to(FeedbackStatus::Resolved));
}

/// Resolution without a binding is rejected.
#[test]
fn feedback_resolution_requires_binding() {
    let mut ticket = ticket();
    ticket.triage(at(10)).unwrap();
    ticket.decide(true, at(20)).unwrap();
    let err = ticket.resolve("editor", None, None, None, at(30));
    assert!(err.is_err());
    assert_eq!(ticket.status, FeedbackStatus::Accepted);
}

/// Overdue detection requires an open ticket past its deadline, unflagged.
#[test]
fn feedback_overdue_detection() {
    let mut ticket = ticket();
    assert!(!ticket.newly_overdue(at(500)));
    assert!(ticket.newly_overdue(at(2_000)));
    ticket.overdue_flag = true;
    assert!(!ticket.newly_overdue(at(2_000)));
}

// ============================================================================
// SECTION: Routing
// ============================================================================

/// Higher-priority rules win; unmatched tickets fall to the default.
#[test]
fn routing_scans_high_priority_first() {
    let policy = RoutingPolicy {
        default_group: "support".to_string(),
        default_sla_hours: 24,
        rules: vec![
            RoutingRule {
                id: "any-high".to_string(),
                priority: 10,
                conditions: RoutingConditions {
                    severity: Some(FeedbackSeverity::High),
                    feedback_type: None,
                    site_id: None,
                    npc_id: None,
                },
                action: RoutingAction {
                    assignee: None,
                    group: "escalation".to_string(),
                    sla_hours: 4,
                },
            },
            RoutingRule {
                id: "fact-errors".to_string(),
                priority: 50,
                conditions: RoutingConditions {
                    severity: None,
                    feedback_type: Some(FeedbackType::FactError),
                    site_id: None,
                    npc_id: None,
                },
                action: RoutingAction {
                    assignee: Some("historian".to_string()),
                    group: "curation".to_string(),
                    sla_hours: 8,
                },
            },
        ],
    };

    let outcome =
        policy.route(FeedbackSeverity::High, FeedbackType::FactError, "main", None);
    assert_eq!(outcome.matched_rule_id, "fact-errors");
    assert_eq!(outcome.group, "curation");
    assert_eq!(outcome.sla_hours, 8);

    let fallback =
        policy.route(FeedbackSeverity::Low, FeedbackType::Praise, "main", None);
    assert_eq!(fallback.matched_rule_id, "default");
    assert_eq!(fallback.group, "support");
    assert_eq!(fallback.sla_hours, 24);
}

// ============================================================================
// SECTION: Alerts
// ============================================================================

/// Dedup keys are stable per `(tenant, site, code)` and distinct otherwise.
#[test]
fn alert_dedup_key_is_stable() {
    let tenant = TenantId::new("tenant-a");
    let key_a = alert_dedup_key(&tenant, None, "high_fallback_rate");
    let key_b = alert_dedup_key(&tenant, None, "high_fallback_rate");
    assert_eq!(key_a, key_b);
    let key_other = alert_dedup_key(&tenant, None, "llm_error_rate");
    assert_ne!(key_a, key_other);
}

/// Silences match only inside their window and matcher.
#[test]
fn silence_matches_within_window() {
    let event = firing_event();
    let silence = AlertSilence {
        id: "sil-1".to_string(),
        tenant_id: TenantId::new("tenant-a"),
        site_id: None,
        alert_code: Some("high_fallback_rate".to_string()),
        severity: None,
        starts_at: at(50),
        ends_at: at(500),
        reason: None,
        created_by: "admin".to_string(),
    };
    assert!(silence.matches(&event, at(100)));
    assert!(!silence.matches(&event, at(600)));

    let other_code = AlertSilence {
        alert_code: Some("llm_error_rate".to_string()),
        ..silence
    };
    assert!(!other_code.matches(&event, at(100)));
}

/// Alert conditions compare as declared.
#[test]
fn alert_conditions_hold() {
    assert!(AlertCondition::GreaterThan.holds(5.0, 3.0));
    assert!(!AlertCondition::GreaterThan.holds(3.0, 3.0));
    assert!(AlertCondition::GreaterOrEqual.holds(3.0, 3.0));
    assert!(AlertCondition::LessThan.holds(1.0, 3.0));
    assert!(AlertCondition::LessOrEqual.holds(3.0, 3.0));
}

// ============================================================================
// SECTION: Traces
// ============================================================================

/// Completion computes a non-negative latency from the timestamps.
#[test]
fn trace_completion_computes_latency() {
    let mut trace = TraceRecord {
        trace_id: TraceId::new("tr-1"),
        scope: Scope::new("tenant-a", "main"),
        session_id: SessionId::new("sess-1"),
        user_id: None,
        npc_id: None,
        request_type: "chat".to_string(),
        request_input: json!({"message": "hello"}),
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
        latency_ms: None,
        tokens: None,
        cost_usd: None,
        guardrail_passed: None,
        release_id: None,
        experiment_id: None,
        experiment_variant: None,
        strategy_snapshot: json!({}),
        status: TraceStatus::Success,
        error: None,
        started_at: at(1_000),
        completed_at: None,
        metadata: json!({}),
    };
    trace.complete(TraceStatus::Success, at(1_250));
    assert_eq!(trace.latency_ms, Some(250));
    assert!(trace.completed_at.unwrap() >= trace.started_at);

    // Clock skew clamps to zero rather than underflowing.
    trace.complete(TraceStatus::Success, at(900));
    assert_eq!(trace.latency_ms, Some(0));
}
