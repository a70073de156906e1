// persona-gate-tools/tests/tool_plane.rs
// ============================================================================
// Module: Tool Plane Tests
// Description: Registry validation, handler execution, and client resilience.
// ============================================================================
//! ## Overview
//! Validates schema enforcement on both ends, handler reads through the
//! cache, and the resilient client: bounded retries, breaker opening after
//! consecutive failures, rejection while open, and recovery through a
//! half-open probe.

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

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use persona_gate_cache::CacheKeyBuilder;
use persona_gate_cache::InMemoryTtlCache;
use persona_gate_config::ToolPolicyConfig;
use persona_gate_config::ToolsConfig;
use persona_gate_core::CatalogStore;
use persona_gate_core::Citation;
use persona_gate_core::EvidenceId;
use persona_gate_core::EvidenceQuery;
use persona_gate_core::NpcId;
use persona_gate_core::NpcProfile;
use persona_gate_core::RetrievalError;
use persona_gate_core::RetrievalProvider;
use persona_gate_core::Scope;
use persona_gate_core::TimeAwareness;
use persona_gate_core::Timestamp;
use persona_gate_core::ToolCallAudit;
use persona_gate_core::TraceId;
use persona_gate_store_sqlite::SqliteStore;
use persona_gate_tools::CircuitBreaker;
use persona_gate_tools::LocalToolInvoker;
use persona_gate_tools::ResilientToolClient;
use persona_gate_tools::ToolAuditSink;
use persona_gate_tools::ToolContext;
use persona_gate_tools::ToolError;
use persona_gate_tools::ToolHandlers;
use persona_gate_tools::ToolInvoker;
use persona_gate_tools::ToolRegistry;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Collecting audit sink.
#[derive(Default)]
struct CollectingSink {
    /// Recorded rows.
    rows: std::sync::Mutex<Vec<ToolCallAudit>>,
}

impl ToolAuditSink for CollectingSink {
    fn record(&self, audit: &ToolCallAudit) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(audit.clone());
        }
    }
}

/// Retrieval stub returning one citation.
struct OneCitation;

#[async_trait]
impl RetrievalProvider for OneCitation {
    fn strategy_name(&self) -> &'static str {
        "fixed"
    }

    async fn retrieve(
        &self,
        _scope: &Scope,
        _query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError> {
        Ok(vec![Citation {
            evidence_id: EvidenceId::new("ev-1"),
            title: "founding charter".to_string(),
            excerpt: "the village charter of record".to_string(),
            score: 0.9,
            confidence: 0.8,
            verified: true,
        }])
    }
}

/// Invoker stub that fails a scripted number of times, then succeeds.
struct FlakyInvoker {
    /// Remaining failures before success.
    failures_left: AtomicU32,
    /// Total invocations observed.
    invocations: AtomicU32,
}

#[async_trait]
impl ToolInvoker for FlakyInvoker {
    async fn invoke(
        &self,
        _name: &str,
        _input: Value,
        _context: &ToolContext,
    ) -> Result<Value, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ToolError::Dependency("backend unavailable".to_string()));
        }
        Ok(json!({"ok": true}))
    }
}

/// Standard test scope.
fn scope() -> Scope {
    Scope::new("tenant-a", "main")
}

/// Call context shorthand.
fn context() -> ToolContext {
    ToolContext {
        scope: scope(),
        trace_id: TraceId::new("tr-1"),
        span_id: None,
        user_id: None,
        session_id: None,
        npc_id: None,
        now: Timestamp::from_unix_millis(1_000),
    }
}

/// Builds handlers over an in-memory store with one profile seeded.
fn seeded_handlers() -> Arc<ToolHandlers> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let profile = NpcProfile {
        npc_id: NpcId::new("elder"),
        scope: scope(),
        version: 1,
        active: true,
        display_name: "Village Elder".to_string(),
        persona: "keeper of local lore".to_string(),
        knowledge_domains: vec!["history".to_string()],
        forbidden_topics: Vec::new(),
        greeting_templates: vec!["Welcome.".to_string()],
        fallback_responses: vec!["I cannot say for certain.".to_string()],
        must_cite_sources: true,
        time_awareness: TimeAwareness::Historical,
        created_at: Timestamp::from_unix_millis(0),
    };
    store.upsert_profile(&profile).unwrap();
    Arc::new(ToolHandlers::new(
        store,
        Arc::new(OneCitation),
        Arc::new(InMemoryTtlCache::new()),
        CacheKeyBuilder::new("pg"),
    ))
}

/// Tools config with a tight policy for breaker tests.
fn tight_config(max_attempts: u32, threshold: u32) -> ToolsConfig {
    ToolsConfig {
        policies: std::collections::BTreeMap::new(),
        default_policy: ToolPolicyConfig {
            priority: 10,
            timeout_ms: 1_000,
            max_attempts,
            circuit_breaker_threshold: threshold,
            breaker_cooldown_ms: 60_000,
        },
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// All seven built-in tools are registered.
#[test]
fn registry_lists_builtin_tools() {
    let registry = ToolRegistry::new();
    let all = registry.list(None, false);
    let names: Vec<&str> = all.iter().map(|spec| spec.name).collect();
    for expected in [
        "get_npc_profile",
        "get_prompt_active",
        "get_site_map",
        "search_content",
        "retrieve_evidence",
        "create_draft_content",
        "log_user_event",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    // Write-side tools are not AI-callable.
    let callable = registry.list(None, true);
    assert!(callable.iter().all(|spec| spec.ai_callable));
    assert!(callable.len() < all.len());
}

/// Schema validation rejects malformed inputs with messages.
#[test]
fn registry_validates_inputs() {
    let registry = ToolRegistry::new();
    assert!(registry.validate_input("get_npc_profile", &json!({"npc_id": "elder"})).is_ok());
    assert!(registry.validate_input("get_npc_profile", &json!({})).is_err());
    assert!(
        registry
            .validate_input("retrieve_evidence", &json!({"query": "x", "top_k": 0, "min_score": 0.2}))
            .is_err()
    );
    assert!(registry.validate_input("no_such_tool", &json!({})).is_err());
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// The local invoker validates both directions and executes the tool.
#[tokio::test]
async fn local_invoker_round_trips_profile() {
    let invoker =
        LocalToolInvoker::new(Arc::new(ToolRegistry::new()), seeded_handlers());
    let output = invoker
        .invoke("get_npc_profile", json!({"npc_id": "elder"}), &context())
        .await
        .unwrap();
    assert_eq!(
        output.pointer("/profile/display_name").and_then(Value::as_str),
        Some("Village Elder")
    );

    let missing = invoker
        .invoke("get_npc_profile", json!({"npc_id": "nobody"}), &context())
        .await
        .unwrap_err();
    assert!(matches!(missing, ToolError::NotFound(_)));
}

/// Evidence retrieval returns citations through the cache path.
#[tokio::test]
async fn retrieve_evidence_returns_citations() {
    let invoker =
        LocalToolInvoker::new(Arc::new(ToolRegistry::new()), seeded_handlers());
    let input = json!({"query": "founding charter", "top_k": 5, "min_score": 0.1});
    let output = invoker.invoke("retrieve_evidence", input.clone(), &context()).await.unwrap();
    let citations = output.get("citations").and_then(Value::as_array).unwrap();
    assert_eq!(citations.len(), 1);

    // Second call is served from cache and stays identical.
    let again = invoker.invoke("retrieve_evidence", input, &context()).await.unwrap();
    assert_eq!(output, again);
}

// ============================================================================
// SECTION: HTTP Round-Trip
// ============================================================================

/// Starts the tool server on an ephemeral port and returns its base URL.
async fn spawn_server(internal_api_key: Option<String>) -> String {
    let state = Arc::new(persona_gate_tools::ToolServerState {
        registry: Arc::new(ToolRegistry::new()),
        handlers: seeded_handlers(),
        internal_api_key,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = persona_gate_tools::ToolServer::new(state).router();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// The HTTP invoker round-trips a call through the live server.
#[tokio::test]
async fn http_invoker_round_trips() {
    let base_url = spawn_server(Some("secret-internal-key".to_string())).await;
    let invoker =
        persona_gate_tools::HttpToolInvoker::new(base_url, Some("secret-internal-key".to_string()))
            .unwrap();
    let output = invoker
        .invoke("get_npc_profile", json!({"npc_id": "elder"}), &context())
        .await
        .unwrap();
    assert_eq!(
        output.pointer("/profile/display_name").and_then(Value::as_str),
        Some("Village Elder")
    );

    // Server-side error classification survives the wire.
    let err = invoker
        .invoke("get_npc_profile", json!({"npc_id": "nobody"}), &context())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::NotFound(_)));
    let err = invoker.invoke("get_npc_profile", json!({}), &context()).await.unwrap_err();
    assert!(matches!(err, ToolError::Validation(_)));
}

/// A missing internal key is rejected before the tool runs.
#[tokio::test]
async fn http_invoker_requires_internal_key() {
    let base_url = spawn_server(Some("secret-internal-key".to_string())).await;
    let invoker = persona_gate_tools::HttpToolInvoker::new(base_url, None).unwrap();
    let err = invoker
        .invoke("get_npc_profile", json!({"npc_id": "elder"}), &context())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Unauthorized | ToolError::Dependency(_)));
}

// ============================================================================
// SECTION: Client Resilience
// ============================================================================

/// Transient failures are retried within the attempt budget.
#[tokio::test]
async fn client_retries_transient_failures() {
    let invoker = Arc::new(FlakyInvoker {
        failures_left: AtomicU32::new(2),
        invocations: AtomicU32::new(0),
    });
    let sink = Arc::new(CollectingSink::default());
    let client = ResilientToolClient::new(
        Arc::clone(&invoker) as Arc<dyn ToolInvoker>,
        tight_config(3, 5),
        Arc::new(CircuitBreaker::new(5, Duration::from_secs(60))),
        Arc::clone(&sink) as Arc<dyn ToolAuditSink>,
        None,
    );
    let output = client.call("retrieve_evidence", json!({}), &context()).await.unwrap();
    assert_eq!(output, json!({"ok": true}));
    assert_eq!(invoker.invocations.load(Ordering::SeqCst), 3);

    let rows = sink.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempts, 3);
}

/// The breaker opens after the threshold and rejects without invoking.
#[tokio::test]
async fn breaker_opens_after_consecutive_failures() {
    let invoker = Arc::new(FlakyInvoker {
        failures_left: AtomicU32::new(u32::MAX),
        invocations: AtomicU32::new(0),
    });
    let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)));
    let client = ResilientToolClient::new(
        Arc::clone(&invoker) as Arc<dyn ToolInvoker>,
        tight_config(1, 3),
        Arc::clone(&breaker),
        Arc::new(CollectingSink::default()),
        None,
    );

    for _ in 0..3 {
        let err = client.call("retrieve_evidence", json!({}), &context()).await.unwrap_err();
        assert!(matches!(err, ToolError::Dependency(_)));
    }
    let invocations_when_open = invoker.invocations.load(Ordering::SeqCst);

    // The open circuit rejects without reaching the tool.
    let err = client.call("retrieve_evidence", json!({}), &context()).await.unwrap_err();
    assert!(matches!(err, ToolError::CircuitOpen));
    assert_eq!(invoker.invocations.load(Ordering::SeqCst), invocations_when_open);
}

/// A successful half-open probe closes the breaker again.
#[tokio::test]
async fn breaker_recovers_through_half_open_probe() {
    let invoker = Arc::new(FlakyInvoker {
        failures_left: AtomicU32::new(2),
        invocations: AtomicU32::new(0),
    });
    let breaker = Arc::new(CircuitBreaker::new(2, Duration::from_millis(10)));
    let client = ResilientToolClient::new(
        Arc::clone(&invoker) as Arc<dyn ToolInvoker>,
        tight_config(1, 2),
        Arc::clone(&breaker),
        Arc::new(CollectingSink::default()),
        None,
    );

    for _ in 0..2 {
        let _ = client.call("retrieve_evidence", json!({}), &context()).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Cool-down elapsed; the probe succeeds and the circuit closes.
    let output = client.call("retrieve_evidence", json!({}), &context()).await.unwrap();
    assert_eq!(output, json!({"ok": true}));
    let output = client.call("retrieve_evidence", json!({}), &context()).await.unwrap();
    assert_eq!(output, json!({"ok": true}));
}
