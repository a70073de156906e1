// persona-gate-providers/src/intent.rs
// ============================================================================
// Module: Intent Classifiers
// Description: Rule-based and LLM-backed query intent classification.
// Purpose: Label turns before the evidence gate decides how to answer.
// Dependencies: persona-gate-cache, persona-gate-core, tokio
// ============================================================================

//! ## Overview
//! The rule classifier matches curated keyword lists (greetings, sensitive
//! topics, history markers, preference phrasing) and is always available.
//! The LLM classifier asks the model for a label, caches results by a
//! fingerprint of the query and persona summary, and falls back to the rule
//! classifier on error or timeout, so classification never fails a turn.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persona_gate_cache::InMemoryTtlCache;
use persona_gate_cache::TtlCache;
use persona_gate_core::Intent;
use persona_gate_core::IntentClassifier;
use persona_gate_core::IntentContext;
use persona_gate_core::IntentResult;
use persona_gate_core::LlmProvider;
use persona_gate_core::LlmRequest;
use persona_gate_core::short_fingerprint;

// ============================================================================
// SECTION: Keyword Lists
// ============================================================================

/// Greeting markers checked against the whole query.
const GREETING_TERMS: &[&str] =
    &["hello", "hi there", "good morning", "good afternoon", "good evening", "greetings", "nihao"];

/// Sensitive-topic markers that force refusal.
const SENSITIVE_TERMS: &[&str] = &[
    "politics",
    "political",
    "religion dispute",
    "gambling",
    "violence",
    "drugs",
    "superstition",
    "pornography",
];

/// History markers; matches mark the query history-related.
const HISTORY_TERMS: &[&str] = &[
    "history",
    "ancestor",
    "ancestors",
    "genealogy",
    "lineage",
    "dynasty",
    "founded",
    "origin",
    "legend",
    "ancient",
    "heritage",
];

/// Fact-seeking markers beyond the history list.
const FACT_TERMS: &[&str] = &[
    "when",
    "what year",
    "who",
    "where",
    "how many",
    "how old",
    "why did",
    "which",
    "did the",
    "what is the",
];

/// Preference markers answered from session context.
const PREFERENCE_TERMS: &[&str] = &[
    "recommend",
    "suggest",
    "prefer",
    "favorite",
    "favourite",
    "should i",
    "what do you like",
    "which do you like",
];

/// Returns the matched terms from a list, lowercased query assumed.
fn matches_in(query: &str, terms: &[&str]) -> Vec<String> {
    terms.iter().filter(|term| query.contains(*term)).map(|term| (*term).to_string()).collect()
}

// ============================================================================
// SECTION: Rule Classifier
// ============================================================================

/// Keyword-list intent classifier.
#[derive(Default)]
pub struct RuleIntentClassifier;

impl RuleIntentClassifier {
    /// Creates the rule classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies synchronously; shared with the LLM fallback path.
    #[must_use]
    pub fn classify_rules(query: &str, context: &IntentContext) -> IntentResult {
        let lowered = query.to_lowercase();

        let forbidden: Vec<String> = context
            .forbidden_topics
            .iter()
            .filter(|topic| lowered.contains(topic.to_lowercase().as_str()))
            .cloned()
            .collect();
        let sensitive = matches_in(&lowered, SENSITIVE_TERMS);
        if !forbidden.is_empty() || !sensitive.is_empty() {
            let mut matched = forbidden;
            matched.extend(sensitive);
            return IntentResult {
                intent: Intent::Sensitive,
                confidence: 0.95,
                reason: "sensitive_keyword".to_string(),
                matched_terms: matched,
                history_related: false,
            };
        }

        let greetings = matches_in(&lowered, GREETING_TERMS);
        if !greetings.is_empty() && lowered.chars().count() < 40 {
            return IntentResult {
                intent: Intent::Greeting,
                confidence: 0.9,
                reason: "greeting_keyword".to_string(),
                matched_terms: greetings,
                history_related: false,
            };
        }

        let history = matches_in(&lowered, HISTORY_TERMS);
        let facts = matches_in(&lowered, FACT_TERMS);
        let preferences = matches_in(&lowered, PREFERENCE_TERMS);

        if !history.is_empty() || (!facts.is_empty() && facts.len() >= preferences.len()) {
            let mut matched = history.clone();
            matched.extend(facts);
            return IntentResult {
                intent: Intent::FactSeeking,
                confidence: if history.is_empty() { 0.7 } else { 0.85 },
                reason: "fact_indicator".to_string(),
                matched_terms: matched,
                history_related: !history.is_empty(),
            };
        }

        if !preferences.is_empty() {
            return IntentResult {
                intent: Intent::ContextPreference,
                confidence: 0.7,
                reason: "preference_indicator".to_string(),
                matched_terms: preferences,
                history_related: false,
            };
        }

        IntentResult::unknown()
    }
}

#[async_trait]
impl IntentClassifier for RuleIntentClassifier {
    fn classifier_name(&self) -> &'static str {
        "rule"
    }

    async fn classify(&self, query: &str, context: &IntentContext) -> IntentResult {
        Self::classify_rules(query, context)
    }
}

// ============================================================================
// SECTION: LLM Classifier
// ============================================================================

/// Labels the model may answer with.
const LABEL_PROMPT: &str = "Classify the visitor question into exactly one label: fact_seeking, \
    context_preference, sensitive, greeting, unknown. Answer with the label only.";

/// LLM-backed classifier with caching and rule fallback.
pub struct LlmIntentClassifier {
    /// Model backend.
    provider: Arc<dyn LlmProvider>,
    /// Result cache keyed by query and persona fingerprint.
    cache: InMemoryTtlCache,
    /// Cache TTL.
    cache_ttl: Duration,
    /// Budget before falling back to rules.
    timeout: Duration,
}

impl LlmIntentClassifier {
    /// Creates an LLM classifier.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>, cache_ttl: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            cache: InMemoryTtlCache::new(),
            cache_ttl,
            timeout,
        }
    }

    /// Parses the model's label into an intent.
    fn parse_label(text: &str) -> Option<Intent> {
        let lowered = text.trim().to_lowercase();
        if lowered.contains("fact_seeking") {
            Some(Intent::FactSeeking)
        } else if lowered.contains("context_preference") {
            Some(Intent::ContextPreference)
        } else if lowered.contains("sensitive") {
            Some(Intent::Sensitive)
        } else if lowered.contains("greeting") {
            Some(Intent::Greeting)
        } else if lowered.contains("unknown") {
            Some(Intent::Unknown)
        } else {
            None
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    fn classifier_name(&self) -> &'static str {
        "llm"
    }

    async fn classify(&self, query: &str, context: &IntentContext) -> IntentResult {
        let cache_key = short_fingerprint(&[query, &context.npc_persona_summary]);
        if let Some(cached) = self.cache.get(&cache_key)
            && let Ok(result) = serde_json::from_str::<IntentResult>(&cached)
        {
            return result;
        }

        let request = LlmRequest {
            system_prompt: format!(
                "{LABEL_PROMPT}\nThe character answering: {}",
                context.npc_persona_summary
            ),
            user_message: query.to_string(),
            temperature: 0.0,
            max_tokens: 8,
            trace_id: None,
            npc_id: None,
        };
        let outcome =
            tokio::time::timeout(self.timeout, self.provider.generate(&request)).await;

        // The history flag always comes from rules; the model only labels.
        let rule_result = RuleIntentClassifier::classify_rules(query, context);
        let result = match outcome {
            Ok(Ok(response)) => Self::parse_label(&response.text).map_or_else(
                || rule_result.clone(),
                |intent| IntentResult {
                    intent,
                    confidence: 0.8,
                    reason: "llm_label".to_string(),
                    matched_terms: Vec::new(),
                    history_related: rule_result.history_related,
                },
            ),
            Ok(Err(_)) | Err(_) => rule_result,
        };

        if let Ok(raw) = serde_json::to_string(&result) {
            self.cache.set(&cache_key, raw, self.cache_ttl);
        }
        result
    }
}
