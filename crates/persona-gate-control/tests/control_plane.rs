// persona-gate-control/tests/control_plane.rs
// ============================================================================
// Module: Control Plane Tests
// Description: Release, experiment, feedback, and alert service coverage.
// ============================================================================
//! ## Overview
//! Validates release payload validation with full offence lists, the
//! activate/rollback round-trip, deterministic idempotent assignment, the
//! routed feedback workflow with overdue scanning, and alert evaluation
//! with dedup, silences, and webhook marking.

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

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use persona_gate_control::AlertEvaluator;
use persona_gate_control::ControlError;
use persona_gate_control::ExperimentService;
use persona_gate_control::FeedbackService;
use persona_gate_control::FeedbackSubmission;
use persona_gate_control::PolicyLoader;
use persona_gate_control::PolicyService;
use persona_gate_control::ReleaseService;
use persona_gate_control::RoutingLoader;
use persona_gate_control::RuntimeConfigService;
use persona_gate_core::AlertCondition;
use persona_gate_core::AlertEvent;
use persona_gate_core::AlertRule;
use persona_gate_core::AlertRuleSet;
use persona_gate_core::AlertSeverity;
use persona_gate_core::AlertSilence;
use persona_gate_core::AlertStore;
use persona_gate_core::CatalogStore;
use persona_gate_core::ExperimentConfig;
use persona_gate_core::ExperimentStatus;
use persona_gate_core::FeedbackSeverity;
use persona_gate_core::FeedbackStatus;
use persona_gate_core::FeedbackType;
use persona_gate_core::GatePolicy;
use persona_gate_core::Intent;
use persona_gate_core::IntentRule;
use persona_gate_core::MetricError;
use persona_gate_core::MetricSource;
use persona_gate_core::NotifyError;
use persona_gate_core::NpcId;
use persona_gate_core::NpcPrompt;
use persona_gate_core::PolicyOverrides;
use persona_gate_core::PolicyStore;
use persona_gate_core::ReleasePayload;
use persona_gate_core::RetrievalDefaults;
use persona_gate_core::Scope;
use persona_gate_core::StrategyOverrides;
use persona_gate_core::SubjectType;
use persona_gate_core::TenantId;
use persona_gate_core::Timestamp;
use persona_gate_core::Variant;
use persona_gate_core::WebhookNotifier;
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

/// Shared in-memory store.
fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().unwrap())
}

/// Builds a policy version.
fn policy(version: &str) -> GatePolicy {
    GatePolicy {
        name: "evidence-gate".to_string(),
        version: version.to_string(),
        is_active: true,
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

/// Seeds a prompt version into the catalog.
fn seed_prompt(store: &SqliteStore, npc: &str, version: u32) {
    let prompt = NpcPrompt {
        npc_id: NpcId::new(npc),
        scope: scope(),
        version,
        active: true,
        content: "You are a careful local guide.".to_string(),
        meta: json!({}),
        policy: json!({}),
        created_at: at(0),
    };
    store.upsert_prompt(&prompt).unwrap();
}

/// Builds a release service wired to one store.
fn release_service(store: &Arc<SqliteStore>) -> ReleaseService {
    ReleaseService::new(
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        "evidence-gate",
    )
}

/// Metric source returning one fixed value per expression.
struct FixedMetrics {
    /// Values keyed by expression.
    values: BTreeMap<String, f64>,
}

impl MetricSource for FixedMetrics {
    fn current_value(
        &self,
        _tenant_id: &TenantId,
        _site_id: Option<&str>,
        expr: &str,
        _window: &str,
    ) -> Result<f64, MetricError> {
        self.values
            .get(expr)
            .copied()
            .ok_or_else(|| MetricError::UnknownExpression(expr.to_string()))
    }
}

/// Webhook stub counting deliveries.
#[derive(Default)]
struct CountingNotifier {
    /// Delivered events.
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl WebhookNotifier for CountingNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(event.alert_code.clone());
        }
        Ok(())
    }
}

/// One high-severity rule firing over 0.3.
fn rule_set() -> AlertRuleSet {
    AlertRuleSet {
        rules: vec![AlertRule {
            code: "high_fallback_rate".to_string(),
            severity: AlertSeverity::High,
            window: "15m".to_string(),
            expr: "fallback_rate".to_string(),
            threshold: 0.3,
            condition: AlertCondition::GreaterThan,
            unit: Some("ratio".to_string()),
        }],
    }
}

// ============================================================================
// SECTION: Release Plane
// ============================================================================

/// Invalid payloads report every offending field at once.
#[test]
fn release_create_reports_all_offences() {
    let store = store();
    let service = release_service(&store);
    let payload = ReleasePayload {
        policy_version: "v9.9".to_string(),
        prompts_active: BTreeMap::from([("elder".to_string(), 3_u32)]),
        experiment_id: Some("missing-exp".into()),
        retrieval_defaults: RetrievalDefaults {
            top_k: 0,
            ..RetrievalDefaults::default()
        },
    };
    let err = service.create(&scope(), "r1", None, payload, "op", at(0)).unwrap_err();
    let ControlError::Validation(offences) = err else {
        panic!("expected validation error");
    };
    assert!(offences.iter().any(|o| o.contains("policy_version")));
    assert!(offences.iter().any(|o| o.contains("prompts_active.elder")));
    assert!(offences.iter().any(|o| o.contains("experiment_id")));
    assert!(offences.iter().any(|o| o.contains("top_k")));
}

/// Activate then rollback round-trips the active bundle.
#[test]
fn release_activate_rollback_round_trip() {
    let store = store();
    store.insert_policy(&policy("v1.0")).unwrap();
    seed_prompt(&store, "elder", 1);
    let service = release_service(&store);

    let payload = ReleasePayload {
        policy_version: "v1.0".to_string(),
        prompts_active: BTreeMap::from([("elder".to_string(), 1_u32)]),
        experiment_id: None,
        retrieval_defaults: RetrievalDefaults::default(),
    };
    let first = service.create(&scope(), "r1", None, payload.clone(), "op", at(0)).unwrap();
    let second = service.create(&scope(), "r2", None, payload, "op", at(1)).unwrap();

    service.activate(&first.id, "op", at(10)).unwrap();
    assert_eq!(service.get_active(&scope()).unwrap().unwrap().id, first.id);

    service.activate(&second.id, "op", at(20)).unwrap();
    assert_eq!(service.get_active(&scope()).unwrap().unwrap().id, second.id);

    service.rollback(&first.id, "op", at(30)).unwrap();
    assert_eq!(service.get_active(&scope()).unwrap().unwrap().id, first.id);
    assert_eq!(service.history(&first.id).unwrap().len(), 2);
}

/// Runtime config reads the active release and falls back to the policy.
#[test]
fn runtime_config_with_fallback() {
    let store = store();
    store.insert_policy(&policy("v1.0")).unwrap();
    seed_prompt(&store, "elder", 1);
    let releases = release_service(&store);
    let runtime = RuntimeConfigService::new(
        Arc::clone(&store) as _,
        Arc::clone(&store) as _,
        "evidence-gate",
    );

    // No release yet: policy fallback, no experiment.
    let npc = NpcId::new("elder");
    let config = runtime.get_config(&scope(), Some(&npc)).unwrap();
    assert!(config.release_id.is_none());
    assert_eq!(config.policy_version.as_deref(), Some("v1.0"));
    assert!(config.experiment_id.is_none());

    let payload = ReleasePayload {
        policy_version: "v1.0".to_string(),
        prompts_active: BTreeMap::from([("elder".to_string(), 1_u32)]),
        experiment_id: None,
        retrieval_defaults: RetrievalDefaults {
            top_k: 7,
            ..RetrievalDefaults::default()
        },
    };
    let release = releases.create(&scope(), "r1", None, payload, "op", at(0)).unwrap();
    releases.activate(&release.id, "op", at(10)).unwrap();

    let config = runtime.get_config(&scope(), Some(&npc)).unwrap();
    assert_eq!(config.release_id, Some(release.id));
    assert_eq!(config.prompt_version, Some(1));
    assert_eq!(config.retrieval_defaults.top_k, 7);
}

// ============================================================================
// SECTION: Policy Loader
// ============================================================================

/// The loader snapshot survives within the TTL and refreshes on invalidation.
#[test]
fn policy_loader_snapshot_and_invalidation() {
    let store = store();
    let audit = Arc::clone(&store) as _;
    let service = PolicyService::new(Arc::clone(&store) as _, audit);
    service.create_version(&scope(), &policy("v1.0"), "op", at(0)).unwrap();

    let loader =
        PolicyLoader::new(Arc::clone(&store) as _, "evidence-gate", Duration::from_secs(60));
    assert_eq!(loader.get().unwrap().unwrap().version, "v1.0");

    // A new version lands behind the snapshot; the TTL hides it until
    // invalidation.
    service.create_version(&scope(), &policy("v1.1"), "op", at(1)).unwrap();
    assert_eq!(loader.get().unwrap().unwrap().version, "v1.0");
    loader.invalidate();
    assert_eq!(loader.get().unwrap().unwrap().version, "v1.1");
}

// ============================================================================
// SECTION: Experiments
// ============================================================================

/// Assignment is deterministic and idempotent across repeated calls.
#[test]
fn assignment_deterministic_and_idempotent() {
    let store = store();
    let service = ExperimentService::new(Arc::clone(&store) as _);
    let experiment = service
        .create(
            &scope(),
            "retrieval-ab",
            None,
            ExperimentConfig {
                variants: vec![
                    Variant {
                        name: "control".to_string(),
                        weight: 50,
                        strategy_overrides: StrategyOverrides::default(),
                    },
                    Variant {
                        name: "treatment".to_string(),
                        weight: 50,
                        strategy_overrides: StrategyOverrides::default(),
                    },
                ],
                subject_type: SubjectType::SessionId,
            },
            at(0),
        )
        .unwrap();
    service.set_status(&experiment.id, ExperimentStatus::Active, at(1)).unwrap();

    let first = service.assign(&experiment.id, "S1", at(10)).unwrap();
    for call in 0..100 {
        let repeat = service.assign(&experiment.id, "S1", at(10 + call)).unwrap();
        assert_eq!(repeat.variant, first.variant);
        assert_eq!(repeat.bucket_hash, first.bucket_hash);
        assert_eq!(repeat.assigned_at, first.assigned_at);
    }
    assert!(first.bucket_hash < 100);
}

/// Draft experiments do not assign.
#[test]
fn assignment_requires_active_experiment() {
    let store = store();
    let service = ExperimentService::new(Arc::clone(&store) as _);
    let experiment = service
        .create(
            &scope(),
            "paused-ab",
            None,
            ExperimentConfig {
                variants: vec![Variant {
                    name: "only".to_string(),
                    weight: 100,
                    strategy_overrides: StrategyOverrides::default(),
                }],
                subject_type: SubjectType::SessionId,
            },
            at(0),
        )
        .unwrap();
    let err = service.assign(&experiment.id, "S1", at(10)).unwrap_err();
    assert!(matches!(err, ControlError::Conflict(_)));
}

// ============================================================================
// SECTION: Feedback Workflow
// ============================================================================

/// Submission routes, stamps the SLA, and the workflow runs to archive.
#[test]
fn feedback_workflow_end_to_end() {
    let store = store();
    let routing = RoutingLoader::new(None, Duration::from_secs(300), "support", 24);
    let service =
        FeedbackService::new(Arc::clone(&store) as _, routing, Arc::clone(&store) as _);

    let ticket = service
        .submit(
            &scope(),
            FeedbackSubmission {
                trace_id: None,
                npc_id: Some(NpcId::new("elder")),
                feedback_type: FeedbackType::FactError,
                severity: FeedbackSeverity::High,
                content: "wrong founding year".to_string(),
            },
            at(0),
        )
        .unwrap();
    assert_eq!(ticket.group.as_deref(), Some("support"));
    assert_eq!(ticket.sla_due_at, Some(at(0).plus_hours(24)));

    service.triage(&ticket.id, "op", at(10)).unwrap();
    service.decide(&ticket.id, true, "op", at(20)).unwrap();
    let resolved = service
        .resolve(&ticket.id, "editor", Some("content-1".to_string()), None, None, at(30))
        .unwrap();
    assert_eq!(resolved.status, FeedbackStatus::Resolved);
    let archived = service.archive(&ticket.id, "op", at(40)).unwrap();
    assert_eq!(archived.status, FeedbackStatus::Archived);

    // Resolution without a binding is a validation error.
    let other = service
        .submit(
            &scope(),
            FeedbackSubmission {
                trace_id: None,
                npc_id: None,
                feedback_type: FeedbackType::Suggestion,
                severity: FeedbackSeverity::Low,
                content: "more stories please".to_string(),
            },
            at(0),
        )
        .unwrap();
    service.triage(&other.id, "op", at(1)).unwrap();
    service.decide(&other.id, true, "op", at(2)).unwrap();
    let err = service.resolve(&other.id, "editor", None, None, None, at(3)).unwrap_err();
    assert!(matches!(err, ControlError::Validation(_)));
}

/// Routing rules load from the JSON file and survive a malformed rewrite.
#[test]
fn routing_rules_load_from_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
  "default_group": "support",
  "default_sla_hours": 24,
  "rules": [
    {{
      "id": "critical-anything",
      "priority": 100,
      "conditions": {{"severity": "critical"}},
      "action": {{"group": "oncall", "sla_hours": 2}}
    }}
  ]
}}"#
    )
    .unwrap();
    let loader = RoutingLoader::new(
        Some(file.path().to_path_buf()),
        Duration::from_secs(300),
        "support",
        24,
    );
    let policy = loader.load();
    let outcome =
        policy.route(FeedbackSeverity::Critical, FeedbackType::Complaint, "main", None);
    assert_eq!(outcome.matched_rule_id, "critical-anything");
    assert_eq!(outcome.group, "oncall");
    assert_eq!(outcome.sla_hours, 2);

    // A malformed file falls back to the default policy instead of failing.
    let broken = RoutingLoader::new(
        Some(std::path::PathBuf::from("/nonexistent/rules.json")),
        Duration::from_secs(300),
        "support",
        24,
    );
    let outcome = broken.load().route(
        FeedbackSeverity::Critical,
        FeedbackType::Complaint,
        "main",
        None,
    );
    assert_eq!(outcome.matched_rule_id, "default");
}

/// The overdue scan flags each late ticket exactly once.
#[test]
fn overdue_scan_flags_once() {
    let store = store();
    let routing = RoutingLoader::new(None, Duration::from_secs(300), "support", 1);
    let service =
        FeedbackService::new(Arc::clone(&store) as _, routing, Arc::clone(&store) as _);
    service
        .submit(
            &scope(),
            FeedbackSubmission {
                trace_id: None,
                npc_id: None,
                feedback_type: FeedbackType::Correction,
                severity: FeedbackSeverity::Medium,
                content: "late ticket".to_string(),
            },
            at(0),
        )
        .unwrap();

    let before_deadline = service.scan_overdue(at(1_000)).unwrap();
    assert_eq!(before_deadline, 0);
    let after_deadline = service.scan_overdue(at(0).plus_hours(2)).unwrap();
    assert_eq!(after_deadline, 1);
    let second_scan = service.scan_overdue(at(0).plus_hours(3)).unwrap();
    assert_eq!(second_scan, 0);
}

// ============================================================================
// SECTION: Alerts
// ============================================================================

/// Repeat firings coalesce; silences suppress webhooks; recovery resolves.
#[tokio::test]
async fn alert_evaluation_dedup_silence_resolve() {
    let store = store();
    let notifier = Arc::new(CountingNotifier::default());
    let tenant = TenantId::new("tenant-a");
    let firing_metrics = Arc::new(FixedMetrics {
        values: BTreeMap::from([("fallback_rate".to_string(), 0.5_f64)]),
    });
    let evaluator = AlertEvaluator::new(
        rule_set(),
        Arc::clone(&store) as _,
        firing_metrics,
        Some(Arc::clone(&notifier) as _),
    );

    // First firing inserts and notifies.
    let summary = evaluator.evaluate(&tenant, None, at(100)).await.unwrap();
    assert_eq!(summary.new_alerts, 1);
    assert_eq!(summary.webhooks_sent, 1);

    // Second firing updates the same row and does not re-notify.
    let summary = evaluator.evaluate(&tenant, None, at(200)).await.unwrap();
    assert_eq!(summary.new_alerts, 0);
    assert_eq!(summary.updated_alerts, 1);
    assert_eq!(summary.webhooks_sent, 0);
    assert_eq!(notifier.delivered.lock().unwrap().len(), 1);

    // Recovery resolves the firing row.
    let recovered_metrics = Arc::new(FixedMetrics {
        values: BTreeMap::from([("fallback_rate".to_string(), 0.1_f64)]),
    });
    let evaluator = AlertEvaluator::new(
        rule_set(),
        Arc::clone(&store) as _,
        recovered_metrics,
        Some(Arc::clone(&notifier) as _),
    );
    let summary = evaluator.evaluate(&tenant, None, at(300)).await.unwrap();
    assert_eq!(summary.resolved_alerts, 1);

    // A silence suppresses the webhook for the next firing.
    store
        .insert_silence(&AlertSilence {
            id: "sil-1".to_string(),
            tenant_id: tenant.clone(),
            site_id: None,
            alert_code: Some("high_fallback_rate".to_string()),
            severity: None,
            starts_at: at(0),
            ends_at: at(10_000),
            reason: None,
            created_by: "admin".to_string(),
        })
        .unwrap();
    let firing_metrics = Arc::new(FixedMetrics {
        values: BTreeMap::from([("fallback_rate".to_string(), 0.6_f64)]),
    });
    let evaluator = AlertEvaluator::new(
        rule_set(),
        Arc::clone(&store) as _,
        firing_metrics,
        Some(Arc::clone(&notifier) as _),
    );
    let summary = evaluator.evaluate(&tenant, None, at(400)).await.unwrap();
    assert_eq!(summary.new_alerts, 1);
    assert_eq!(summary.silenced_alerts, 1);
    assert_eq!(summary.webhooks_sent, 0);
    assert_eq!(notifier.delivered.lock().unwrap().len(), 1);
}
