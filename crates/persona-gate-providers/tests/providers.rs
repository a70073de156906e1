// persona-gate-providers/tests/providers.rs
// ============================================================================
// Module: Provider Tests
// Description: Trigram scoring, hybrid fusion, intent, and retry coverage.
// ============================================================================
//! ## Overview
//! Exercises the pure and in-process provider paths: trigram similarity,
//! hybrid fusion with deterministic tie-breaks, rule classification, the
//! LLM classifier's fallback, and the shared retry helper.

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
use std::time::Duration;

use async_trait::async_trait;
use persona_gate_core::Citation;
use persona_gate_core::EmbeddingProvider;
use persona_gate_core::EvidenceId;
use persona_gate_core::EvidenceQuery;
use persona_gate_core::Intent;
use persona_gate_core::IntentClassifier;
use persona_gate_core::IntentContext;
use persona_gate_core::LlmError;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::LlmRequest;
use persona_gate_core::RetrievalError;
use persona_gate_core::RetrievalProvider;
use persona_gate_core::Scope;
use persona_gate_providers::AuditedEmbeddingProvider;
use persona_gate_providers::HybridRetriever;
use persona_gate_providers::LlmIntentClassifier;
use persona_gate_providers::RuleIntentClassifier;
use persona_gate_providers::SandboxProvider;
use persona_gate_providers::generate_with_retry;
use persona_gate_providers::trigram_similarity;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Retrieval stub returning fixed citations.
struct FixedRetriever {
    /// Citations returned for every query.
    citations: Vec<Citation>,
}

#[async_trait]
impl RetrievalProvider for FixedRetriever {
    fn strategy_name(&self) -> &'static str {
        "fixed"
    }

    async fn retrieve(
        &self,
        _scope: &Scope,
        _query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError> {
        Ok(self.citations.clone())
    }
}

/// Citation shorthand.
fn citation(id: &str, score: f64) -> Citation {
    Citation {
        evidence_id: EvidenceId::new(id),
        title: format!("title {id}"),
        excerpt: "excerpt".to_string(),
        score,
        confidence: 0.8,
        verified: false,
    }
}

/// Query shorthand.
fn query(top_k: usize, min_score: f64) -> EvidenceQuery {
    EvidenceQuery {
        query: "founding year of the village".to_string(),
        domains: Vec::new(),
        top_k,
        min_score,
    }
}

// ============================================================================
// SECTION: Trigram Similarity
// ============================================================================

/// Identical texts score 1.0; disjoint texts score 0.0.
#[test]
fn trigram_similarity_bounds() {
    assert!((trigram_similarity("ancestral hall", "ancestral hall") - 1.0).abs() < f64::EPSILON);
    assert!(trigram_similarity("ancestral hall", "zzzz qqqq").abs() < f64::EPSILON);
    assert!(trigram_similarity("", "anything").abs() < f64::EPSILON);
}

/// Overlapping texts score strictly between the bounds.
#[test]
fn trigram_similarity_partial_overlap() {
    let score = trigram_similarity("founding year village", "village founding stories");
    assert!(score > 0.0 && score < 1.0);
}

/// Similarity is symmetric and case-insensitive.
#[test]
fn trigram_similarity_symmetric() {
    let forward = trigram_similarity("Ancestral Hall", "the ancestral hall");
    let backward = trigram_similarity("the ancestral hall", "Ancestral Hall");
    assert!((forward - backward).abs() < f64::EPSILON);
}

// ============================================================================
// SECTION: Hybrid Fusion
// ============================================================================

/// Evidence found by both sides outranks single-side hits.
#[tokio::test]
async fn hybrid_fusion_prefers_agreement() {
    let trgm = Arc::new(FixedRetriever {
        citations: vec![citation("shared", 0.2), citation("trgm-only", 0.9)],
    });
    let qdrant = Arc::new(FixedRetriever {
        citations: vec![citation("shared", 0.95), citation("qdrant-only", 0.1)],
    });
    let hybrid = HybridRetriever::new(trgm, qdrant, 0.5, 0.5);
    let scope = Scope::new("tenant-a", "main");
    let results = hybrid.retrieve(&scope, &query(3, 0.0)).await.unwrap();
    assert_eq!(results[0].evidence_id, EvidenceId::new("shared"));
}

/// Ties break by evidence id ascending and top-k caps the output.
#[tokio::test]
async fn hybrid_fusion_deterministic_and_capped() {
    let trgm = Arc::new(FixedRetriever {
        citations: vec![citation("b", 0.5), citation("a", 0.5), citation("c", 0.5)],
    });
    let qdrant = Arc::new(FixedRetriever {
        citations: Vec::new(),
    });
    let hybrid = HybridRetriever::new(trgm, qdrant, 1.0, 0.0);
    let scope = Scope::new("tenant-a", "main");
    let results = hybrid.retrieve(&scope, &query(2, 0.0)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].evidence_id, EvidenceId::new("a"));
    assert_eq!(results[1].evidence_id, EvidenceId::new("b"));
}

// ============================================================================
// SECTION: Rule Classification
// ============================================================================

/// History questions are fact-seeking and history-related.
#[test]
fn rule_classifier_labels_history() {
    let result = RuleIntentClassifier::classify_rules(
        "When was the ancestral hall founded?",
        &IntentContext::default(),
    );
    assert_eq!(result.intent, Intent::FactSeeking);
    assert!(result.history_related);
}

/// Forbidden topics from the persona force the sensitive label.
#[test]
fn rule_classifier_honours_forbidden_topics() {
    let context = IntentContext {
        npc_persona_summary: String::new(),
        forbidden_topics: vec!["land disputes".to_string()],
    };
    let result =
        RuleIntentClassifier::classify_rules("Tell me about the land disputes here", &context);
    assert_eq!(result.intent, Intent::Sensitive);
}

/// Greetings and preference questions get their own labels.
#[test]
fn rule_classifier_labels_greeting_and_preference() {
    let context = IntentContext::default();
    let greeting = RuleIntentClassifier::classify_rules("Hello!", &context);
    assert_eq!(greeting.intent, Intent::Greeting);
    let preference =
        RuleIntentClassifier::classify_rules("What tea would you recommend?", &context);
    assert_eq!(preference.intent, Intent::ContextPreference);
}

// ============================================================================
// SECTION: LLM Classifier Fallback
// ============================================================================

/// A failing model backend degrades to the rule classifier.
#[tokio::test]
async fn llm_classifier_falls_back_to_rules() {
    let provider = Arc::new(SandboxProvider::with_failures(vec![LlmErrorKind::Server]));
    let classifier = LlmIntentClassifier::new(
        provider,
        Duration::from_secs(300),
        Duration::from_millis(500),
    );
    let result = classifier
        .classify("When was the ancestral hall founded?", &IntentContext::default())
        .await;
    assert_eq!(result.intent, Intent::FactSeeking);
    assert!(result.history_related);
}

// ============================================================================
// SECTION: Embedding Usage Audit
// ============================================================================

/// Embedding stub producing a fixed vector.
struct FixedEmbedder {
    /// Failure kind to script, if any.
    failure: Option<LlmErrorKind>,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed-embed"
    }

    fn dimension(&self) -> usize {
        4
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        match self.failure {
            Some(kind) => Err(LlmError::new(kind, "scripted embedding failure")),
            None => Ok(vec![0.1, 0.2, 0.3, 0.4]),
        }
    }
}

/// Usage sink collecting appended rows.
#[derive(Default)]
struct CollectingUsage {
    /// Recorded rows.
    rows: std::sync::Mutex<Vec<persona_gate_core::EmbeddingUsage>>,
}

impl persona_gate_core::UsageStore for CollectingUsage {
    fn append_embedding_usage(
        &self,
        usage: &persona_gate_core::EmbeddingUsage,
    ) -> Result<(), persona_gate_core::StoreError> {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(usage.clone());
        }
        Ok(())
    }
}

/// Every embedding call records one usage row with its outcome.
#[tokio::test]
async fn audited_embedding_records_usage() {
    let usage = Arc::new(CollectingUsage::default());
    let provider = AuditedEmbeddingProvider::new(
        Arc::new(FixedEmbedder {
            failure: None,
        }),
        Arc::clone(&usage) as _,
        Scope::new("tenant-a", "main"),
    );
    let vector = provider.embed("the founding charter").await.unwrap();
    assert_eq!(vector.len(), 4);

    let rows = usage.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].provider, "fixed");
    assert_eq!(rows[0].embedding_dim, 4);
    assert_eq!(rows[0].status, persona_gate_core::EmbeddingCallStatus::Success);
    assert!(rows[0].input_chars > 0);
    assert!(!rows[0].content_hash.is_empty());
}

/// Rate-limited calls are recorded distinctly from other failures.
#[tokio::test]
async fn audited_embedding_classifies_rate_limits() {
    let usage = Arc::new(CollectingUsage::default());
    let provider = AuditedEmbeddingProvider::new(
        Arc::new(FixedEmbedder {
            failure: Some(LlmErrorKind::RateLimit),
        }),
        Arc::clone(&usage) as _,
        Scope::new("tenant-a", "main"),
    );
    assert!(provider.embed("text").await.is_err());
    let rows = usage.rows.lock().unwrap();
    assert_eq!(rows[0].status, persona_gate_core::EmbeddingCallStatus::RateLimited);
}

// ============================================================================
// SECTION: Retry Helper
// ============================================================================

/// Retryable failures are retried within the attempt budget.
#[tokio::test]
async fn retry_recovers_from_transient_failures() {
    let provider =
        SandboxProvider::with_failures(vec![LlmErrorKind::Network, LlmErrorKind::Server]);
    let request = LlmRequest {
        system_prompt: "system".to_string(),
        user_message: "hello".to_string(),
        temperature: 0.7,
        max_tokens: 100,
        trace_id: None,
        npc_id: None,
    };
    let response = generate_with_retry(&provider, &request, 3).await.unwrap();
    assert!(response.text.contains("hello"));
}

/// Non-retryable failures surface immediately.
#[tokio::test]
async fn retry_surfaces_auth_failures() {
    let provider = SandboxProvider::with_failures(vec![LlmErrorKind::Auth]);
    let request = LlmRequest {
        system_prompt: "system".to_string(),
        user_message: "hello".to_string(),
        temperature: 0.7,
        max_tokens: 100,
        trace_id: None,
        npc_id: None,
    };
    let err = generate_with_retry(&provider, &request, 3).await.unwrap_err();
    assert_eq!(err.kind, LlmErrorKind::Auth);
}

/// The attempt budget bounds retries.
#[tokio::test]
async fn retry_exhausts_attempt_budget() {
    let provider = SandboxProvider::with_failures(vec![
        LlmErrorKind::Server,
        LlmErrorKind::Server,
        LlmErrorKind::Server,
    ]);
    let request = LlmRequest {
        system_prompt: "system".to_string(),
        user_message: "hello".to_string(),
        temperature: 0.7,
        max_tokens: 100,
        trace_id: None,
        npc_id: None,
    };
    let err = generate_with_retry(&provider, &request, 3).await.unwrap_err();
    assert_eq!(err.kind, LlmErrorKind::Server);
}
