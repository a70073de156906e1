// persona-gate-orchestrator/src/pipeline.rs
// ============================================================================
// Module: Turn Pipeline
// Description: The per-turn state machine from query to grounded answer.
// Purpose: Orchestrate resolve, gate, generate, validate, and persist.
// Dependencies: persona-gate-control, persona-gate-providers, persona-gate-tools, tokio
// ============================================================================

//! ## Overview
//! One turn runs: resolve persona and runtime bundle (concurrently), assign
//! the experiment variant, read session memory, classify intent, retrieve
//! evidence, decide the gate, assemble the prompt, call the model with
//! bounded retries, validate the output, and commit the trace with its
//! message in one transaction. Retrieval failure degrades to conservative;
//! model failure returns the apology with a failed trace; the overall
//! deadline persists a truncated timeout trace best effort. Turns for the
//! same session are serialised by a keyed async lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use persona_gate_cache::SessionMemory;
use persona_gate_control::ExperimentService;
use persona_gate_control::PolicyLoader;
use persona_gate_control::RuntimeConfig;
use persona_gate_core::Citation;
use persona_gate_core::EvidenceId;
use persona_gate_core::GateEvaluator;
use persona_gate_core::GateInput;
use persona_gate_core::GatePolicy;
use persona_gate_core::Intent;
use persona_gate_core::IntentClassifier;
use persona_gate_core::IntentContext;
use persona_gate_core::IntentRule;
use persona_gate_core::LlmProvider;
use persona_gate_core::LlmRequest;
use persona_gate_core::Message;
use persona_gate_core::MessageRole;
use persona_gate_core::NpcProfile;
use persona_gate_core::NpcPrompt;
use persona_gate_core::PolicyMode;
use persona_gate_core::PolicyOverrides;
use persona_gate_core::RetrievalDefaults;
use persona_gate_core::RuleOverride;
use persona_gate_core::SessionId;
use persona_gate_core::StrategyOverrides;
use persona_gate_core::Timestamp;
use persona_gate_core::TokenUsage;
use persona_gate_core::ToolCallRecord;
use persona_gate_core::TraceId;
use persona_gate_core::TraceRecord;
use persona_gate_core::TraceStatus;
use persona_gate_core::TraceStore;
use persona_gate_providers::generate_with_retry;
use persona_gate_tools::ResilientToolClient;
use persona_gate_tools::ToolContext;
use persona_gate_tools::ToolError;
use serde_json::Value;
use serde_json::json;
use uuid::Uuid;

use crate::chat::ChatError;
use crate::chat::ChatRequest;
use crate::chat::ChatResponse;
use crate::prompt::PromptAssembler;
use crate::runtime::CachedRuntimeConfig;
use crate::validator::OutputValidator;

// ============================================================================
// SECTION: Dials
// ============================================================================

/// Turn-level dials.
#[derive(Debug, Clone)]
pub struct OrchestratorDials {
    /// Sampling temperature for the model call.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Attempt budget for the model call.
    pub llm_max_attempts: u32,
    /// Overall per-turn deadline.
    pub turn_deadline: Duration,
    /// Whether session memory is read and written.
    pub memory_enabled: bool,
    /// Memory messages included in the prompt.
    pub memory_messages: usize,
    /// Character budget for the prompt's memory section.
    pub memory_chars: usize,
}

impl Default for OrchestratorDials {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1_000,
            llm_max_attempts: 3,
            turn_deadline: Duration::from_secs(60),
            memory_enabled: true,
            memory_messages: 10,
            memory_chars: 4_000,
        }
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Collaborators the orchestrator is wired from.
pub struct OrchestratorParts {
    /// Resilient tool plane client.
    pub tools: Arc<ResilientToolClient>,
    /// Cached runtime bundle source.
    pub runtime: Arc<CachedRuntimeConfig>,
    /// Evidence-gate policy loader.
    pub policy: Arc<PolicyLoader>,
    /// Experiment assignment service.
    pub experiments: Arc<ExperimentService>,
    /// Intent classifier.
    pub intent: Arc<dyn IntentClassifier>,
    /// Model backend.
    pub llm: Arc<dyn LlmProvider>,
    /// Session memory.
    pub memory: Arc<SessionMemory>,
    /// Trace ledger.
    pub traces: Arc<dyn TraceStore>,
    /// Turn dials.
    pub dials: OrchestratorDials,
}

/// The per-turn orchestrator.
pub struct Orchestrator {
    /// Resilient tool plane client.
    tools: Arc<ResilientToolClient>,
    /// Cached runtime bundle source.
    runtime: Arc<CachedRuntimeConfig>,
    /// Evidence-gate policy loader.
    policy: Arc<PolicyLoader>,
    /// Experiment assignment service.
    experiments: Arc<ExperimentService>,
    /// Intent classifier.
    intent: Arc<dyn IntentClassifier>,
    /// Model backend.
    llm: Arc<dyn LlmProvider>,
    /// Session memory.
    memory: Arc<SessionMemory>,
    /// Trace ledger.
    traces: Arc<dyn TraceStore>,
    /// Turn dials.
    dials: OrchestratorDials,
    /// Prompt assembler.
    assembler: PromptAssembler,
    /// Output validator.
    validator: OutputValidator,
    /// Per-session write serialisation.
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Orchestrator {
    /// Wires an orchestrator from its collaborators.
    #[must_use]
    pub fn new(parts: OrchestratorParts) -> Self {
        let assembler = PromptAssembler::new(
            8,
            parts.dials.memory_messages,
            parts.dials.memory_chars,
        );
        Self {
            tools: parts.tools,
            runtime: parts.runtime,
            policy: parts.policy,
            experiments: parts.experiments,
            intent: parts.intent,
            llm: parts.llm,
            memory: parts.memory,
            traces: parts.traces,
            dials: parts.dials,
            assembler,
            validator: OutputValidator::new(),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one turn under the overall deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] only for a missing persona, an unreachable
    /// persona source, or an exceeded deadline; everything else degrades
    /// into the shaped response.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let started_at = now_timestamp();
        let started = Instant::now();
        let trace_id = request
            .trace_id
            .clone()
            .unwrap_or_else(|| TraceId::new(Uuid::new_v4().to_string()));
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| SessionId::new(Uuid::new_v4().to_string()));

        // Two concurrent turns for the same session must not interleave
        // their memory and trace writes.
        let lock = self.session_lock(&request, &session_id);
        let _guard = lock.lock().await;

        let turn = self.run_turn(&request, &trace_id, &session_id, started_at, started);
        match tokio::time::timeout(self.dials.turn_deadline, turn).await {
            Ok(result) => result,
            Err(_) => {
                self.persist_timeout_trace(&request, &trace_id, &session_id, started_at);
                Err(ChatError::Timeout)
            }
        }
    }

    /// Returns the serialisation lock for a session.
    fn session_lock(
        &self,
        request: &ChatRequest,
        session_id: &SessionId,
    ) -> Arc<tokio::sync::Mutex<()>> {
        let key = format!("{}:{session_id}", request.scope);
        let Ok(mut locks) = self.session_locks.lock() else {
            return Arc::new(tokio::sync::Mutex::new(()));
        };
        Arc::clone(locks.entry(key).or_default())
    }

    /// The turn body, cancelled as a whole by the outer deadline.
    async fn run_turn(
        &self,
        request: &ChatRequest,
        trace_id: &TraceId,
        session_id: &SessionId,
        started_at: Timestamp,
        started: Instant,
    ) -> Result<ChatResponse, ChatError> {
        let context = ToolContext {
            scope: request.scope.clone(),
            trace_id: trace_id.clone(),
            span_id: None,
            user_id: request.user_id.clone(),
            session_id: Some(session_id.clone()),
            npc_id: Some(request.npc_id.clone()),
            now: started_at,
        };

        let mut tool_calls: Vec<ToolCallRecord> = Vec::new();

        // Resolve: the persona and the runtime bundle are independent reads.
        let resolve_started = Instant::now();
        let profile_call = self.tools.call(
            "get_npc_profile",
            json!({"npc_id": request.npc_id}),
            &context,
        );
        let runtime_call = self.runtime.get(&request.scope, Some(&request.npc_id));
        let (profile_result, config) = tokio::join!(profile_call, runtime_call);
        record_tool_call(&mut tool_calls, "get_npc_profile", resolve_started, &profile_result);
        let profile = decode_profile(profile_result, &request.npc_id.to_string())?;

        let mut prompt_input = json!({"npc_id": request.npc_id});
        if let Some(version) = config.prompt_version {
            prompt_input["version"] = json!(version);
        }
        let prompt_started = Instant::now();
        let prompt_result = self.tools.call("get_prompt_active", prompt_input, &context).await;
        record_tool_call(&mut tool_calls, "get_prompt_active", prompt_started, &prompt_result);
        let prompt = decode_prompt(prompt_result, &request.npc_id.to_string())?;

        // Experiment assignment; any failure means the turn runs unassigned.
        let assignment = config.experiment_id.as_ref().and_then(|experiment_id| {
            self.experiments
                .assign_for(experiment_id, session_id, request.user_id.as_ref(), started_at)
                .ok()
        });
        let overrides = assignment
            .as_ref()
            .map_or_else(StrategyOverrides::default, |a| a.strategy_overrides.clone());
        let retrieval = config.retrieval_defaults.merged_with(&overrides);
        let gate_override = RuleOverride {
            min_evidence_count: overrides.min_evidence_count,
            min_confidence: overrides.min_confidence,
            require_verified: None,
        };

        let memory = if self.dials.memory_enabled {
            self.memory.history(&request.scope, session_id, &request.npc_id)
        } else {
            Vec::new()
        };

        let intent_context = IntentContext {
            npc_persona_summary: profile.persona_summary(),
            forbidden_topics: profile.forbidden_topics.clone(),
        };
        let intent = self.intent.classify(&request.query, &intent_context).await;

        // Greeting short-circuit: answer from the template without
        // retrieval or a model call.
        if intent.intent == Intent::Greeting
            && let Some(greeting) = profile.greeting()
        {
            let answer = greeting.to_string();
            self.write_memory(request, session_id, &answer);
            let trace = self.build_trace(TraceParts {
                request,
                trace_id,
                session_id,
                request_type: "greeting",
                citations: &[],
                mode: PolicyMode::Normal,
                reason: Some("greeting_template".to_string()),
                applied_rule_id: None,
                policy_version: None,
                answer: &answer,
                tool_calls: tool_calls.clone(),
                model: None,
                tokens: None,
                guardrail_passed: Some(true),
                config: &config,
                variant: assignment.as_ref().map(|a| a.variant.clone()),
                retrieval: &retrieval,
                status: TraceStatus::Success,
                error: None,
                started_at,
            });
            let latency_ms = trace.latency_ms.unwrap_or(0);
            self.commit(trace, request, session_id, &answer, &[], started_at);
            return Ok(ChatResponse {
                trace_id: trace_id.clone(),
                session_id: session_id.clone(),
                policy_mode: PolicyMode::Normal,
                answer_text: answer,
                citations: Vec::new(),
                followup_questions: Vec::new(),
                npc_name: Some(profile.display_name.clone()),
                latency_ms,
            });
        }

        // Retrieve evidence; failure degrades instead of failing the turn.
        let mut retrieval_failed = false;
        let citations = if intent.intent == Intent::Sensitive {
            Vec::new()
        } else {
            let retrieve_started = Instant::now();
            let retrieve_result = self
                .tools
                .call(
                    "retrieve_evidence",
                    json!({
                        "query": request.query,
                        "domains": profile.knowledge_domains,
                        "top_k": retrieval.top_k,
                        "min_score": retrieval.min_score,
                    }),
                    &context,
                )
                .await;
            record_tool_call(&mut tool_calls, "retrieve_evidence", retrieve_started, &retrieve_result);
            match retrieve_result {
                Ok(output) => decode_citations(&output),
                Err(_) => {
                    retrieval_failed = true;
                    Vec::new()
                }
            }
        };

        // Evidence gate.
        let policy = self.policy.get().ok().flatten().unwrap_or_else(builtin_policy);
        let evaluator = GateEvaluator::new(policy);
        let mut decision = evaluator.evaluate(&GateInput {
            intent: intent.intent,
            history_related: intent.history_related,
            citations: &citations,
            npc_id: &request.npc_id,
            site_id: &request.scope.site_id,
            experiment_override: Some(&gate_override),
        });
        if retrieval_failed && decision.mode == PolicyMode::Normal {
            decision.mode = PolicyMode::Conservative;
            decision.reason = "retrieval_failed".to_string();
        }

        // Answer.
        let mut status = TraceStatus::Success;
        let mut error = None;
        let mut model = None;
        let mut tokens = None;
        let (mut answer, mut surviving) = match decision.mode {
            PolicyMode::Refuse => (OutputValidator::refuse_template().to_string(), Vec::new()),
            PolicyMode::Conservative => {
                (OutputValidator::conservative_template(&profile).to_string(), Vec::new())
            }
            PolicyMode::Normal => {
                let system_prompt =
                    self.assembler.assemble(&prompt.content, &profile, &citations, &memory);
                let llm_request = LlmRequest {
                    system_prompt,
                    user_message: request.query.clone(),
                    temperature: self.dials.temperature,
                    max_tokens: self.dials.max_tokens,
                    trace_id: Some(trace_id.clone()),
                    npc_id: Some(request.npc_id.clone()),
                };
                match generate_with_retry(
                    self.llm.as_ref(),
                    &llm_request,
                    self.dials.llm_max_attempts,
                )
                .await
                {
                    Ok(response) => {
                        model = Some(response.model.clone());
                        tokens = Some(TokenUsage {
                            prompt_tokens: response.prompt_tokens,
                            completion_tokens: response.completion_tokens,
                        });
                        (response.text, citations.clone())
                    }
                    Err(err) => {
                        status = TraceStatus::Failed;
                        error = Some(err.to_string());
                        (OutputValidator::apology_template().to_string(), Vec::new())
                    }
                }
            }
        };

        // Output validation downgrades, never errors.
        let mut mode = decision.mode;
        let outcome = self.validator.validate(&answer, &request.query, &profile, mode);
        if !outcome.passed {
            mode = outcome.mode;
            if let Some(replacement) = outcome.replacement {
                answer = replacement;
            }
            surviving.clear();
        }

        let followups = followup_questions(&surviving);
        self.write_memory(request, session_id, &answer);

        let trace = self.build_trace(TraceParts {
            request,
            trace_id,
            session_id,
            request_type: "chat",
            citations: &surviving,
            mode,
            reason: outcome.reason.or(Some(decision.reason)),
            applied_rule_id: Some(decision.applied_rule.rule_id.clone()),
            policy_version: Some(decision.policy_version.clone()),
            answer: &answer,
            tool_calls,
            model,
            tokens,
            guardrail_passed: Some(outcome.passed),
            config: &config,
            variant: assignment.as_ref().map(|a| a.variant.clone()),
            retrieval: &retrieval,
            status,
            error,
            started_at,
        });
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.commit(trace, request, session_id, &answer, &surviving, started_at);

        Ok(ChatResponse {
            trace_id: trace_id.clone(),
            session_id: session_id.clone(),
            policy_mode: mode,
            answer_text: answer,
            citations: surviving,
            followup_questions: followups,
            npc_name: Some(profile.display_name),
            latency_ms,
        })
    }

    /// Appends the user turn to session memory.
    fn write_memory(&self, request: &ChatRequest, session_id: &SessionId, answer: &str) {
        if !self.dials.memory_enabled {
            return;
        }
        self.memory.append(
            &request.scope,
            session_id,
            &request.npc_id,
            MessageRole::User,
            request.query.clone(),
        );
        self.memory.append(
            &request.scope,
            session_id,
            &request.npc_id,
            MessageRole::Assistant,
            answer,
        );
    }

    /// Builds the trace row for one turn.
    fn build_trace(&self, parts: TraceParts<'_>) -> TraceRecord {
        let now = now_timestamp();
        let evidence_ids: Vec<EvidenceId> =
            parts.citations.iter().map(|citation| citation.evidence_id.clone()).collect();
        let mut trace = TraceRecord {
            trace_id: parts.trace_id.clone(),
            scope: parts.request.scope.clone(),
            session_id: parts.session_id.clone(),
            user_id: parts.request.user_id.clone(),
            npc_id: Some(parts.request.npc_id.clone()),
            request_type: parts.request_type.to_string(),
            request_input: json!({"query": parts.request.query}),
            tool_calls: parts.tool_calls,
            evidence_ids,
            evidence_chain: serde_json::to_value(parts.citations).unwrap_or(Value::Null),
            policy_mode: parts.mode,
            policy_reason: parts.reason,
            applied_rule_id: parts.applied_rule_id,
            policy_version: parts.policy_version,
            response_output: Some(json!({"answer_text": parts.answer})),
            model_provider: parts.model.as_ref().map(|_| self.llm.provider_name().to_string()),
            model_name: parts.model,
            latency_ms: None,
            tokens: parts.tokens,
            cost_usd: None,
            guardrail_passed: parts.guardrail_passed,
            release_id: parts.config.release_id.clone(),
            experiment_id: parts.config.experiment_id.clone(),
            experiment_variant: parts.variant,
            strategy_snapshot: serde_json::to_value(parts.retrieval).unwrap_or(Value::Null),
            status: parts.status,
            error: parts.error,
            started_at: parts.started_at,
            completed_at: None,
            metadata: json!({}),
        };
        trace.complete(parts.status, now);
        trace
    }

    /// Commits the trace and the assistant message atomically, best effort.
    fn commit(
        &self,
        trace: TraceRecord,
        request: &ChatRequest,
        session_id: &SessionId,
        answer: &str,
        citations: &[Citation],
        started_at: Timestamp,
    ) {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            scope: request.scope.clone(),
            session_id: session_id.clone(),
            role: MessageRole::Assistant,
            content: answer.to_string(),
            evidence_ids: citations.iter().map(|citation| citation.evidence_id.clone()).collect(),
            trace_id: Some(trace.trace_id.clone()),
            created_at: started_at,
        };
        let _ = self.traces.commit_turn(&trace, Some(&message));
    }

    /// Persists a truncated trace after the overall deadline, best effort.
    fn persist_timeout_trace(
        &self,
        request: &ChatRequest,
        trace_id: &TraceId,
        session_id: &SessionId,
        started_at: Timestamp,
    ) {
        let mut trace = TraceRecord {
            trace_id: trace_id.clone(),
            scope: request.scope.clone(),
            session_id: session_id.clone(),
            user_id: request.user_id.clone(),
            npc_id: Some(request.npc_id.clone()),
            request_type: "chat".to_string(),
            request_input: json!({"query": request.query}),
            tool_calls: Vec::new(),
            evidence_ids: Vec::new(),
            evidence_chain: json!([]),
            policy_mode: PolicyMode::Conservative,
            policy_reason: Some("deadline_exceeded".to_string()),
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
            status: TraceStatus::Timeout,
            error: Some("turn deadline exceeded".to_string()),
            started_at,
            completed_at: None,
            metadata: json!({}),
        };
        trace.complete(TraceStatus::Timeout, now_timestamp());
        let _ = self.traces.commit_turn(&trace, None);
    }
}

// ============================================================================
// SECTION: Trace Assembly Inputs
// ============================================================================

/// Inputs for building one trace row.
struct TraceParts<'a> {
    /// Originating request.
    request: &'a ChatRequest,
    /// Trace identifier.
    trace_id: &'a TraceId,
    /// Session identifier.
    session_id: &'a SessionId,
    /// Request kind label.
    request_type: &'static str,
    /// Citations that survived the gate.
    citations: &'a [Citation],
    /// Final policy mode.
    mode: PolicyMode,
    /// Machine-readable decision reason.
    reason: Option<String>,
    /// Rule that decided.
    applied_rule_id: Option<String>,
    /// Policy version that decided.
    policy_version: Option<String>,
    /// Final answer text.
    answer: &'a str,
    /// Tool call records for the turn.
    tool_calls: Vec<ToolCallRecord>,
    /// Model name when a model call happened.
    model: Option<String>,
    /// Token usage when a model call happened.
    tokens: Option<TokenUsage>,
    /// Whether the guardrail passed the answer unchanged.
    guardrail_passed: Option<bool>,
    /// Runtime bundle the turn ran under.
    config: &'a RuntimeConfig,
    /// Experiment variant, when assigned.
    variant: Option<String>,
    /// Effective retrieval dials.
    retrieval: &'a RetrievalDefaults,
    /// Terminal status.
    status: TraceStatus,
    /// Error description when failed.
    error: Option<String>,
    /// Turn start timestamp.
    started_at: Timestamp,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fail-closed policy used when no active policy exists.
fn builtin_policy() -> GatePolicy {
    let default_rule = IntentRule {
        intent: Intent::Unknown,
        min_evidence_count: 1,
        min_confidence: 0.5,
        require_verified: false,
        allowed_soft_claims: Vec::new(),
    };
    GatePolicy {
        name: "evidence-gate".to_string(),
        version: "builtin".to_string(),
        is_active: true,
        intent_rules: Vec::new(),
        default_rule,
        overrides: PolicyOverrides::default(),
        created_at: Timestamp::from_unix_millis(0),
    }
}

/// Decodes the profile tool output, classifying resolution failures.
fn decode_profile(
    result: Result<Value, ToolError>,
    npc_id: &str,
) -> Result<NpcProfile, ChatError> {
    match result {
        Ok(output) => output
            .get("profile")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| ChatError::Unavailable(format!("profile payload malformed for {npc_id}"))),
        Err(ToolError::NotFound(message)) => Err(ChatError::NotFound(message)),
        Err(err) => Err(ChatError::Unavailable(err.to_string())),
    }
}

/// Decodes the prompt tool output, classifying resolution failures.
fn decode_prompt(result: Result<Value, ToolError>, npc_id: &str) -> Result<NpcPrompt, ChatError> {
    match result {
        Ok(output) => output
            .get("prompt")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| ChatError::Unavailable(format!("prompt payload malformed for {npc_id}"))),
        Err(ToolError::NotFound(message)) => Err(ChatError::NotFound(message)),
        Err(err) => Err(ChatError::Unavailable(err.to_string())),
    }
}

/// Records one tool call outcome into the per-turn list.
fn record_tool_call(
    tool_calls: &mut Vec<ToolCallRecord>,
    name: &str,
    started: Instant,
    result: &Result<Value, ToolError>,
) {
    tool_calls.push(ToolCallRecord {
        tool_name: name.to_string(),
        success: result.is_ok(),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        error_type: result.as_ref().err().map(|err| err.error_kind().as_str().to_string()),
        request_payload_hash: None,
    });
}

/// Decodes citations from the retrieval tool output.
fn decode_citations(output: &Value) -> Vec<Citation> {
    output
        .get("citations")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// Builds up to three follow-up suggestions from citation titles.
fn followup_questions(citations: &[Citation]) -> Vec<String> {
    citations
        .iter()
        .take(3)
        .filter(|citation| !citation.title.is_empty())
        .map(|citation| format!("Would you like to hear more about {}?", citation.title))
        .collect()
}

/// Current wall-clock time as a platform timestamp.
fn now_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(0))
}
