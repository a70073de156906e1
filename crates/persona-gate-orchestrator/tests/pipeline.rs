// persona-gate-orchestrator/tests/pipeline.rs
// ============================================================================
// Module: Turn Pipeline Tests
// Description: End-to-end turns over in-memory backends.
// ============================================================================
//! ## Overview
//! Drives whole turns through the real pipeline wiring (sqlite store, local
//! tool plane, trigram retrieval, sandbox model): evidence-first downgrade,
//! per-NPC override, greeting short-circuit, model-failure fallback,
//! sensitive refusal, and the trace rows each turn leaves behind.

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
use std::time::Duration;

use persona_gate_cache::CacheKeyBuilder;
use persona_gate_cache::InMemoryTtlCache;
use persona_gate_cache::MemoryLimits;
use persona_gate_cache::SessionMemory;
use persona_gate_config::ToolsConfig;
use persona_gate_control::ExperimentService;
use persona_gate_control::PolicyLoader;
use persona_gate_control::ReleaseService;
use persona_gate_control::RuntimeConfigService;
use persona_gate_core::CatalogStore;
use persona_gate_core::Evidence;
use persona_gate_core::EvidenceId;
use persona_gate_core::GatePolicy;
use persona_gate_core::Intent;
use persona_gate_core::IntentRule;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::LlmProvider;
use persona_gate_core::NpcId;
use persona_gate_core::NpcProfile;
use persona_gate_core::NpcPrompt;
use persona_gate_core::PolicyMode;
use persona_gate_core::PolicyOverrides;
use persona_gate_core::PolicyStore;
use persona_gate_core::ReleasePayload;
use persona_gate_core::RetrievalDefaults;
use persona_gate_core::RetrievalStrategy;
use persona_gate_core::RuleOverride;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::TimeAwareness;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use persona_gate_core::TraceStatus;
use persona_gate_core::TraceStore;
use persona_gate_orchestrator::CachedRuntimeConfig;
use persona_gate_orchestrator::ChatError;
use persona_gate_orchestrator::ChatRequest;
use persona_gate_orchestrator::Orchestrator;
use persona_gate_orchestrator::OrchestratorDials;
use persona_gate_orchestrator::OrchestratorParts;
use persona_gate_providers::RuleIntentClassifier;
use persona_gate_providers::SandboxProvider;
use persona_gate_providers::TrgmRetriever;
use persona_gate_store_sqlite::SqliteStore;
use persona_gate_tools::CircuitBreaker;
use persona_gate_tools::LocalToolInvoker;
use persona_gate_tools::NoopToolAuditSink;
use persona_gate_tools::ResilientToolClient;
use persona_gate_tools::ToolHandlers;
use persona_gate_tools::ToolRegistry;
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

/// Seeds a profile for one NPC.
fn seed_profile(store: &SqliteStore, npc: &str) {
    let profile = NpcProfile {
        npc_id: NpcId::new(npc),
        scope: scope(),
        version: 1,
        active: true,
        display_name: format!("{npc} of the village"),
        persona: "A careful keeper of village lore who answers from records.".to_string(),
        knowledge_domains: vec!["history".to_string()],
        forbidden_topics: vec!["land disputes".to_string()],
        greeting_templates: vec!["Welcome, traveller. What brings you here?".to_string()],
        fallback_responses: vec![
            "I am not certain of that; the elders may remember more.".to_string(),
        ],
        must_cite_sources: true,
        time_awareness: TimeAwareness::Historical,
        created_at: at(0),
    };
    store.upsert_profile(&profile).unwrap();
    let prompt = NpcPrompt {
        npc_id: NpcId::new(npc),
        scope: scope(),
        version: 1,
        active: true,
        content: "You answer as a villager of the old hamlet.".to_string(),
        meta: json!({}),
        policy: json!({}),
        created_at: at(0),
    };
    store.upsert_prompt(&prompt).unwrap();
}

/// Seeds one verified evidence row about the ancestral hall.
fn seed_evidence(store: &SqliteStore) {
    let evidence = Evidence {
        id: EvidenceId::new("ev-hall"),
        scope: scope(),
        source_type: "archive".to_string(),
        source_ref: "county annals, vol. 2".to_string(),
        title: "The ancestral hall founding".to_string(),
        excerpt: "The ancestral hall was founded in the sixteenth century by the Yan lineage."
            .to_string(),
        confidence: 0.8,
        verified: true,
        tags: Vec::new(),
        domains: vec!["history".to_string()],
        vector_updated_at: None,
        vector_hash: None,
        created_at: at(0),
    };
    store.insert_evidence(&evidence).unwrap();
}

/// Seeds the evidence-gate policy: fact-seeking needs two citations, with a
/// relaxed per-NPC override for `ancestor_yan`.
fn seed_policy(store: &SqliteStore) {
    let mut overrides = PolicyOverrides::default();
    overrides.per_npc.insert(
        "ancestor_yan".to_string(),
        RuleOverride {
            min_evidence_count: Some(1),
            min_confidence: None,
            require_verified: None,
        },
    );
    let policy = GatePolicy {
        name: "evidence-gate".to_string(),
        version: "v1.2".to_string(),
        is_active: true,
        intent_rules: vec![IntentRule {
            intent: Intent::FactSeeking,
            min_evidence_count: 2,
            min_confidence: 0.5,
            require_verified: false,
            allowed_soft_claims: Vec::new(),
        }],
        default_rule: IntentRule {
            intent: Intent::Unknown,
            min_evidence_count: 0,
            min_confidence: 0.0,
            require_verified: false,
            allowed_soft_claims: Vec::new(),
        },
        overrides,
        created_at: at(0),
    };
    store.insert_policy(&policy).unwrap();
}

/// Activates a release with permissive retrieval dials.
fn seed_release(store: &Arc<SqliteStore>, npcs: &[&str]) {
    let service = ReleaseService::new(
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        Arc::clone(store) as _,
        "evidence-gate",
    );
    let prompts = npcs.iter().map(|npc| ((*npc).to_string(), 1_u32)).collect::<BTreeMap<_, _>>();
    let payload = ReleasePayload {
        policy_version: "v1.2".to_string(),
        prompts_active: prompts,
        experiment_id: None,
        retrieval_defaults: RetrievalDefaults {
            strategy: RetrievalStrategy::Trgm,
            top_k: 5,
            min_score: 0.01,
            trgm_weight: 1.0,
            qdrant_weight: 0.0,
        },
    };
    let release = service.create(&scope(), "live", None, payload, "op", at(0)).unwrap();
    service.activate(&release.id, "op", at(1)).unwrap();
}

/// Wires a full orchestrator over one store and model backend.
fn orchestrator(store: &Arc<SqliteStore>, llm: Arc<dyn LlmProvider>) -> Orchestrator {
    let cache = Arc::new(InMemoryTtlCache::new());
    let retrieval = Arc::new(TrgmRetriever::new(Arc::clone(store) as _, 200));
    let handlers = Arc::new(ToolHandlers::new(
        Arc::clone(store) as _,
        retrieval,
        Arc::clone(&cache) as _,
        CacheKeyBuilder::new("pg"),
    ));
    let invoker = Arc::new(LocalToolInvoker::new(Arc::new(ToolRegistry::new()), handlers));
    let tools = Arc::new(ResilientToolClient::new(
        invoker,
        ToolsConfig::default(),
        Arc::new(CircuitBreaker::new(5, Duration::from_secs(30))),
        Arc::new(NoopToolAuditSink),
        Some(Arc::clone(store) as _),
    ));
    let runtime = Arc::new(CachedRuntimeConfig::new(
        Arc::new(RuntimeConfigService::new(
            Arc::clone(store) as _,
            Arc::clone(store) as _,
            "evidence-gate",
        )),
        Duration::from_secs(60),
    ));
    let policy = Arc::new(PolicyLoader::new(
        Arc::clone(store) as _,
        "evidence-gate",
        Duration::from_secs(60),
    ));
    let experiments = Arc::new(ExperimentService::new(Arc::clone(store) as _));
    let memory = Arc::new(SessionMemory::new(
        Arc::clone(&cache) as _,
        CacheKeyBuilder::new("pg"),
        MemoryLimits::default(),
    ));
    Orchestrator::new(OrchestratorParts {
        tools,
        runtime,
        policy,
        experiments,
        intent: Arc::new(RuleIntentClassifier::new()),
        llm,
        memory,
        traces: Arc::clone(store) as _,
        dials: OrchestratorDials::default(),
    })
}

/// Fact-seeking request shorthand.
fn request(npc: &str, query: &str) -> ChatRequest {
    ChatRequest {
        scope: scope(),
        npc_id: NpcId::new(npc),
        query: query.to_string(),
        session_id: Some(SessionId::new("sess-1")),
        user_id: None,
        trace_id: None,
    }
}

// ============================================================================
// SECTION: Evidence-First Downgrade
// ============================================================================

/// A fact query with no qualifying evidence answers with the NPC's first
/// fallback and writes a fully attributed trace.
#[tokio::test]
async fn evidence_first_downgrade_to_conservative() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "elder");
    seed_policy(&store);
    seed_release(&store, &["elder"]);
    // No evidence seeded: retrieval returns nothing.
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let mut chat_request = request("elder", "When was the ancestral hall founded?");
    chat_request.trace_id = Some(TraceId::new("tr-cons"));
    let response = orchestrator.chat(chat_request).await.unwrap();

    assert_eq!(response.policy_mode, PolicyMode::Conservative);
    assert_eq!(response.answer_text, "I am not certain of that; the elders may remember more.");
    assert!(response.citations.is_empty());

    let trace = store.trace_by_id(&TraceId::new("tr-cons")).unwrap().unwrap();
    assert_eq!(trace.policy_mode, PolicyMode::Conservative);
    assert_eq!(trace.applied_rule_id.as_deref(), Some("intent:fact_seeking"));
    assert_eq!(trace.policy_version.as_deref(), Some("v1.2"));
    assert_eq!(trace.status, TraceStatus::Success);
    assert!(trace.release_id.is_some());
}

// ============================================================================
// SECTION: Per-NPC Override
// ============================================================================

/// With one citation, the overridden NPC answers normally while another NPC
/// stays conservative under the same policy.
#[tokio::test]
async fn per_npc_override_changes_outcome() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "elder");
    seed_profile(&store, "ancestor_yan");
    seed_policy(&store);
    seed_evidence(&store);
    seed_release(&store, &["elder", "ancestor_yan"]);
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let query = "Who founded the ancestral hall?";
    let relaxed = orchestrator.chat(request("ancestor_yan", query)).await.unwrap();
    assert_eq!(relaxed.policy_mode, PolicyMode::Normal);
    assert_eq!(relaxed.citations.len(), 1);
    assert!(!relaxed.followup_questions.is_empty());

    let strict = orchestrator.chat(request("elder", query)).await.unwrap();
    assert_eq!(strict.policy_mode, PolicyMode::Conservative);
    assert!(strict.citations.is_empty());
}

// ============================================================================
// SECTION: Greeting Short-Circuit
// ============================================================================

/// Greetings answer from the template without touching retrieval.
#[tokio::test]
async fn greeting_short_circuits() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "elder");
    seed_policy(&store);
    seed_release(&store, &["elder"]);
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let response = orchestrator.chat(request("elder", "Hello!")).await.unwrap();
    assert_eq!(response.policy_mode, PolicyMode::Normal);
    assert_eq!(response.answer_text, "Welcome, traveller. What brings you here?");
    assert!(response.citations.is_empty());
}

// ============================================================================
// SECTION: Failure Semantics
// ============================================================================

/// Model failure after retries returns the apology and a failed trace.
#[tokio::test]
async fn llm_failure_returns_apology() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "ancestor_yan");
    seed_policy(&store);
    seed_evidence(&store);
    seed_release(&store, &["ancestor_yan"]);
    let failing = Arc::new(SandboxProvider::with_failures(vec![
        LlmErrorKind::Server,
        LlmErrorKind::Server,
        LlmErrorKind::Server,
    ]));
    let orchestrator = orchestrator(&store, failing);

    let mut chat_request = request("ancestor_yan", "Who founded the ancestral hall?");
    chat_request.trace_id = Some(TraceId::new("tr-fail"));
    let response = orchestrator.chat(chat_request).await.unwrap();
    assert!(response.answer_text.contains("Forgive me"));
    assert!(response.citations.is_empty());

    let trace = store.trace_by_id(&TraceId::new("tr-fail")).unwrap().unwrap();
    assert_eq!(trace.status, TraceStatus::Failed);
    assert!(trace.error.is_some());
}

/// Sensitive queries refuse before any retrieval happens.
#[tokio::test]
async fn sensitive_query_refuses() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "elder");
    seed_policy(&store);
    seed_release(&store, &["elder"]);
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let response =
        orchestrator.chat(request("elder", "Tell me about the land disputes here")).await.unwrap();
    assert_eq!(response.policy_mode, PolicyMode::Refuse);
    assert!(response.citations.is_empty());
}

/// An unknown NPC fails fast with not-found.
#[tokio::test]
async fn unknown_npc_fails_fast() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_policy(&store);
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let err = orchestrator.chat(request("nobody", "Hello!")).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

/// Trace ids are unique per turn even within one session.
#[tokio::test]
async fn turns_write_unique_traces() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    seed_profile(&store, "elder");
    seed_policy(&store);
    seed_release(&store, &["elder"]);
    let orchestrator = orchestrator(&store, Arc::new(SandboxProvider::new()));

    let first = orchestrator.chat(request("elder", "Hello!")).await.unwrap();
    let second = orchestrator.chat(request("elder", "Hello!")).await.unwrap();
    assert_ne!(first.trace_id, second.trace_id);
    assert!(store.trace_by_id(&first.trace_id).unwrap().is_some());
    assert!(store.trace_by_id(&second.trace_id).unwrap().is_some());
}
