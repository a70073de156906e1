// persona-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Persona Gate Interfaces
// Description: Backend-agnostic interfaces for providers and stores.
// Purpose: Define the contract surfaces the pipeline and control plane use.
// Dependencies: crate::core, async-trait
// ============================================================================

//! ## Overview
//! Interfaces define how Persona Gate integrates with language models, vector
//! stores, metric sources, and durable storage without embedding
//! backend-specific details. Implementations must classify their failures
//! into the shared taxonomy and fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::alerts::AlertEvent;
use crate::core::alerts::AlertSilence;
use crate::core::audit::AdminAuditEntry;
use crate::core::audit::ToolCallAudit;
use crate::core::content::Content;
use crate::core::conversation::Message;
use crate::core::error::ErrorKind;
use crate::core::evidence::Citation;
use crate::core::evidence::Evidence;
use crate::core::evidence::EvidenceQuery;
use crate::core::experiment::Experiment;
use crate::core::experiment::ExperimentAssignment;
use crate::core::experiment::ExperimentStatus;
use crate::core::feedback::Feedback;
use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::ExperimentId;
use crate::core::identifiers::FeedbackId;
use crate::core::identifiers::NpcId;
use crate::core::identifiers::ReleaseId;
use crate::core::identifiers::Scope;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::TraceId;
use crate::core::intent::IntentResult;
use crate::core::persona::NpcProfile;
use crate::core::persona::NpcPrompt;
use crate::core::policy::GatePolicy;
use crate::core::release::Release;
use crate::core::release::ReleaseAction;
use crate::core::release::ReleaseHistory;
use crate::core::site::SiteMap;
use crate::core::time::Timestamp;
use crate::core::trace::TraceRecord;
use crate::core::usage::EmbeddingUsage;

// ============================================================================
// SECTION: LLM Provider
// ============================================================================

/// Request handed to an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Assembled system prompt.
    pub system_prompt: String,
    /// User message for the turn.
    pub user_message: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Trace the call runs under, for provider-side audit.
    pub trace_id: Option<TraceId>,
    /// NPC the call answers for.
    pub npc_id: Option<NpcId>,
}

/// Response returned by an LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Model that produced the text.
    pub model: String,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
    /// Provider finish reason (`stop`, `length`, `content_filter`).
    pub finish_reason: String,
    /// Provider-measured latency in milliseconds.
    pub latency_ms: u64,
}

/// Classified LLM failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Credentials rejected.
    Auth,
    /// Network-level failure.
    Network,
    /// Deadline exceeded.
    Timeout,
    /// Provider rate limited the call.
    RateLimit,
    /// Provider-side failure (5xx).
    Server,
    /// Request rejected as invalid (4xx).
    InvalidRequest,
    /// Content rejected by the provider's safety filter.
    ContentFilter,
    /// Unclassified failure.
    Unknown,
}

impl LlmErrorKind {
    /// Returns whether calls failing this way may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimit | Self::Server)
    }

    /// Maps the provider failure into the shared taxonomy.
    #[must_use]
    pub const fn error_kind(self) -> ErrorKind {
        match self {
            Self::Auth => ErrorKind::Auth,
            Self::Network | Self::Server | Self::Unknown => ErrorKind::Dependency,
            Self::Timeout => ErrorKind::Timeout,
            Self::RateLimit => ErrorKind::RateLimit,
            Self::InvalidRequest => ErrorKind::Validation,
            Self::ContentFilter => ErrorKind::ContentFilter,
        }
    }

    /// Returns the stable wire label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::InvalidRequest => "invalid_request",
            Self::ContentFilter => "content_filter",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified LLM provider error.
#[derive(Debug, Clone, Error)]
#[error("[{kind}] {message}")]
pub struct LlmError {
    /// Failure category.
    pub kind: LlmErrorKind,
    /// Human-readable description.
    pub message: String,
    /// HTTP status when the failure came off the wire.
    pub status_code: Option<u16>,
}

impl LlmError {
    /// Creates a classified error.
    #[must_use]
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
        }
    }

    /// Creates a classified error carrying the HTTP status.
    #[must_use]
    pub fn with_status(kind: LlmErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: Some(status),
        }
    }
}

/// Capability interface over a language model backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name recorded on traces.
    fn provider_name(&self) -> &str;

    /// Returns the model name recorded on traces.
    fn model_name(&self) -> &str;

    /// Generates a completion for the request.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when the call fails; callers retry only when
    /// [`LlmErrorKind::is_retryable`] holds.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Returns whether the backend is currently reachable.
    async fn health_check(&self) -> bool;
}

/// Capability interface over an embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the provider name recorded in usage rows.
    fn provider_name(&self) -> &str;

    /// Returns the model name recorded in usage rows.
    fn model_name(&self) -> &str;

    /// Returns the vector dimension this backend produces.
    fn dimension(&self) -> usize;

    /// Embeds one text into a vector.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when the call fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

// ============================================================================
// SECTION: Retrieval Provider
// ============================================================================

/// Errors returned by retrieval providers.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Backend reported an error.
    #[error("retrieval provider error: {0}")]
    Provider(String),
    /// Retrieval exceeded its deadline.
    #[error("retrieval timed out: {0}")]
    Timeout(String),
}

/// Capability interface over a retrieval strategy.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Returns the strategy label recorded on traces.
    fn strategy_name(&self) -> &'static str;

    /// Retrieves ranked citations for a query.
    ///
    /// Results are ordered by descending score with ties broken by evidence
    /// id ascending, and never exceed `query.top_k`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] when the backend fails; the pipeline
    /// degrades to conservative mode instead of failing the turn.
    async fn retrieve(
        &self,
        scope: &Scope,
        query: &EvidenceQuery,
    ) -> Result<Vec<Citation>, RetrievalError>;
}

// ============================================================================
// SECTION: Intent Classifier
// ============================================================================

/// Context handed to intent classifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentContext {
    /// Short persona summary used in cache keys.
    pub npc_persona_summary: String,
    /// Topics the NPC refuses to discuss.
    pub forbidden_topics: Vec<String>,
}

/// Capability interface over query intent classification.
///
/// Classification is infallible: implementations degrade internally (the LLM
/// classifier falls back to rules on error or timeout).
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Returns the classifier label recorded on traces.
    fn classifier_name(&self) -> &'static str;

    /// Classifies one query.
    async fn classify(&self, query: &str, context: &IntentContext) -> IntentResult;
}

// ============================================================================
// SECTION: Metric Source and Webhooks
// ============================================================================

/// Errors returned by metric sources.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The expression is not known to this source.
    #[error("unknown metric expression: {0}")]
    UnknownExpression(String),
    /// The source failed to produce a value.
    #[error("metric source error: {0}")]
    Source(String),
}

/// Source of metric values for alert evaluation.
pub trait MetricSource: Send + Sync {
    /// Computes the current value of an expression over a window for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError`] when the expression is unknown or the source
    /// fails.
    fn current_value(
        &self,
        tenant_id: &TenantId,
        site_id: Option<&str>,
        expr: &str,
        window: &str,
    ) -> Result<f64, MetricError>;
}

/// Errors returned by webhook notifiers.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Delivery failed.
    #[error("webhook delivery failed: {0}")]
    Delivery(String),
}

/// Delivers alert notifications to an external webhook.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    /// Delivers one alert event.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails; the evaluator leaves
    /// `webhook_sent` unset so the next cycle retries.
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors returned by durable stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Referenced record does not exist.
    #[error("store record not found: {0}")]
    NotFound(String),
    /// Uniqueness or state-transition conflict.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Stored or supplied data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Maps the store failure into the shared taxonomy.
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Corrupt(_) => ErrorKind::Dependency,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Invalid(_) => ErrorKind::Validation,
        }
    }
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

/// Store for NPC profiles, prompts, evidence, content, and site maps.
pub trait CatalogStore: Send + Sync {
    /// Loads the active profile version for an NPC.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_profile(&self, scope: &Scope, npc_id: &NpcId)
    -> Result<Option<NpcProfile>, StoreError>;

    /// Saves a profile version, deactivating prior versions when active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn upsert_profile(&self, profile: &NpcProfile) -> Result<(), StoreError>;

    /// Loads the active prompt version for an NPC.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_prompt(&self, scope: &Scope, npc_id: &NpcId) -> Result<Option<NpcPrompt>, StoreError>;

    /// Loads a specific prompt version for an NPC.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn prompt_version(
        &self,
        scope: &Scope,
        npc_id: &NpcId,
        version: u32,
    ) -> Result<Option<NpcPrompt>, StoreError>;

    /// Saves a prompt version, deactivating prior versions when active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn upsert_prompt(&self, prompt: &NpcPrompt) -> Result<(), StoreError>;

    /// Inserts an evidence row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_evidence(&self, evidence: &Evidence) -> Result<(), StoreError>;

    /// Loads evidence rows by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn evidence_by_ids(&self, scope: &Scope, ids: &[EvidenceId])
    -> Result<Vec<Evidence>, StoreError>;

    /// Lists evidence filtered to the given domains (all when empty).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn evidence_in_domains(
        &self,
        scope: &Scope,
        domains: &[String],
        limit: usize,
    ) -> Result<Vec<Evidence>, StoreError>;

    /// Inserts a content row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_content(&self, content: &Content) -> Result<(), StoreError>;

    /// Searches content by keyword with optional type and tag filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the search fails.
    fn search_content(
        &self,
        scope: &Scope,
        keyword: &str,
        content_type: Option<&str>,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Content>, StoreError>;

    /// Loads the site map for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn site_map(&self, scope: &Scope) -> Result<Option<SiteMap>, StoreError>;

    /// Saves the site map for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn upsert_site_map(&self, map: &SiteMap) -> Result<(), StoreError>;

    /// Appends an analytics event row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn log_user_event(
        &self,
        scope: &Scope,
        event_type: &str,
        payload: &serde_json::Value,
        created_at: Timestamp,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Store for evidence-gate policy versions.
pub trait PolicyStore: Send + Sync {
    /// Loads the active policy version for a name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_policy(&self, name: &str) -> Result<Option<GatePolicy>, StoreError>;

    /// Loads a specific policy version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn policy_version(&self, name: &str, version: &str) -> Result<Option<GatePolicy>, StoreError>;

    /// Lists all versions of a policy, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_policy_versions(&self, name: &str) -> Result<Vec<GatePolicy>, StoreError>;

    /// Inserts a policy version, deactivating prior versions when active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails or the version exists.
    fn insert_policy(&self, policy: &GatePolicy) -> Result<(), StoreError>;

    /// Makes an existing version the active one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the version does not exist.
    fn set_active_policy(&self, name: &str, version: &str) -> Result<GatePolicy, StoreError>;
}

// ============================================================================
// SECTION: Release Store
// ============================================================================

/// Store for release bundles and their history.
pub trait ReleaseStore: Send + Sync {
    /// Inserts a draft release.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_release(&self, release: &Release) -> Result<(), StoreError>;

    /// Loads a release by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError>;

    /// Loads the active release for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_release(&self, scope: &Scope) -> Result<Option<Release>, StoreError>;

    /// Atomically swaps the active release of the target's scope.
    ///
    /// The previous active release (if any) becomes archived, the target
    /// becomes active, and a history row is appended, all in one
    /// transaction. Concurrent activations for the same scope are
    /// linearised by the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the target does not exist and
    /// [`StoreError::Conflict`] when its status forbids the action.
    fn swap_active(
        &self,
        id: &ReleaseId,
        action: ReleaseAction,
        operator: &str,
        now: Timestamp,
    ) -> Result<Release, StoreError>;

    /// Lists history rows for a release, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn release_history(&self, id: &ReleaseId) -> Result<Vec<ReleaseHistory>, StoreError>;
}

// ============================================================================
// SECTION: Experiment Store
// ============================================================================

/// Store for experiments and bucket assignments.
pub trait ExperimentStore: Send + Sync {
    /// Inserts an experiment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_experiment(&self, experiment: &Experiment) -> Result<(), StoreError>;

    /// Loads an experiment by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, StoreError>;

    /// Updates an experiment's status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the experiment does not exist.
    fn set_experiment_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// Loads the assignment for a subject, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn assignment(
        &self,
        id: &ExperimentId,
        subject_key: &str,
    ) -> Result<Option<ExperimentAssignment>, StoreError>;

    /// Inserts an assignment unless one already exists for the subject.
    ///
    /// Implements insert-or-ignore semantics: the first writer wins and the
    /// call reports whether this writer inserted the row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn try_insert_assignment(&self, assignment: &ExperimentAssignment)
    -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Trace Store
// ============================================================================

/// Store for the per-turn trace ledger.
pub trait TraceStore: Send + Sync {
    /// Commits one turn: the trace row and its message, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the trace id already exists.
    fn commit_turn(&self, trace: &TraceRecord, message: Option<&Message>)
    -> Result<(), StoreError>;

    /// Loads a trace row for replay.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn trace_by_id(&self, trace_id: &TraceId) -> Result<Option<TraceRecord>, StoreError>;
}

// ============================================================================
// SECTION: Feedback Store
// ============================================================================

/// Store for feedback tickets.
pub trait FeedbackStore: Send + Sync {
    /// Inserts a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError>;

    /// Loads a ticket by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn feedback(&self, id: &FeedbackId) -> Result<Option<Feedback>, StoreError>;

    /// Replaces a ticket row after a workflow transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the ticket does not exist.
    fn update_feedback(&self, feedback: &Feedback) -> Result<(), StoreError>;

    /// Lists open tickets whose SLA deadline passed and are not yet flagged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn overdue_candidates(&self, now: Timestamp) -> Result<Vec<Feedback>, StoreError>;

    /// Sets the overdue flag on the given tickets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn mark_overdue(&self, ids: &[FeedbackId], now: Timestamp) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Alert Store
// ============================================================================

/// Store for alert events and silences.
pub trait AlertStore: Send + Sync {
    /// Loads the firing event for a dedup key, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn firing_event(&self, dedup_key: &str) -> Result<Option<AlertEvent>, StoreError>;

    /// Inserts a new alert event row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a firing row already exists for
    /// the dedup key.
    fn insert_event(&self, event: &AlertEvent) -> Result<(), StoreError>;

    /// Updates `last_seen_at` and `current_value` on a firing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no firing row exists.
    fn touch_event(&self, dedup_key: &str, value: f64, now: Timestamp) -> Result<(), StoreError>;

    /// Resolves the firing row for a dedup key, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn resolve_event(&self, dedup_key: &str, now: Timestamp) -> Result<bool, StoreError>;

    /// Marks the webhook as sent on an event row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row does not exist.
    fn mark_webhook_sent(&self, event_id: &str, now: Timestamp) -> Result<(), StoreError>;

    /// Lists silences overlapping `now` for a tenant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn active_silences(
        &self,
        tenant_id: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<AlertSilence>, StoreError>;

    /// Inserts a silence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn insert_silence(&self, silence: &AlertSilence) -> Result<(), StoreError>;

    /// Deletes a silence by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when deletion fails.
    fn delete_silence(&self, id: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Audit Stores
// ============================================================================

/// Append-only store for control-plane audit entries.
pub trait AdminAuditStore: Send + Sync {
    /// Appends one audit entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn append_admin_audit(&self, entry: &AdminAuditEntry) -> Result<(), StoreError>;
}

/// Append-only store for tool-call audit rows.
pub trait ToolAuditStore: Send + Sync {
    /// Appends one tool-call audit row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn append_tool_audit(&self, audit: &ToolCallAudit) -> Result<(), StoreError>;
}

/// Append-only store for embedding usage rows.
pub trait UsageStore: Send + Sync {
    /// Appends one embedding usage row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when saving fails.
    fn append_embedding_usage(&self, usage: &EmbeddingUsage) -> Result<(), StoreError>;
}
