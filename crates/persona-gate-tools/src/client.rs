// persona-gate-tools/src/client.rs
// ============================================================================
// Module: Resilient Tool Client
// Description: Tool invocation with timeouts, retries, and circuit breaking.
// Purpose: Give the orchestrator a tool plane that degrades instead of hangs.
// Dependencies: persona-gate-config, persona-gate-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! A [`ToolInvoker`] is the raw transport: in-process handlers or the HTTP
//! tool server. [`ResilientToolClient`] wraps an invoker with the per-tool
//! policy: a timeout per call, bounded retries with exponential backoff and
//! jitter on retryable errors only, and a circuit breaker per
//! `(tool, tenant, site)`. Every call emits an audit row through the sink
//! and the durable audit store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use persona_gate_config::ToolsConfig;
use persona_gate_core::ErrorKind;
use persona_gate_core::NpcId;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::StoreError;
use persona_gate_core::Timestamp;
use persona_gate_core::ToolAuditStore;
use persona_gate_core::ToolCallAudit;
use persona_gate_core::ToolCallStatus;
use persona_gate_core::TraceId;
use persona_gate_core::UserId;
use persona_gate_core::hash_canonical_json;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::ToolAuditSink;
use crate::breaker::CircuitBreaker;
use crate::handlers::ToolHandlers;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Context carried with every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Tenant and site the call runs in.
    pub scope: Scope,
    /// Trace the call belongs to.
    pub trace_id: TraceId,
    /// Span within the trace, when nested.
    pub span_id: Option<String>,
    /// End user, when known.
    pub user_id: Option<UserId>,
    /// Session the call belongs to, when known.
    pub session_id: Option<SessionId>,
    /// NPC the call answers for, when known.
    pub npc_id: Option<NpcId>,
    /// Caller-supplied timestamp for audit rows.
    pub now: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Classified tool plane errors.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name is not registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// Payload failed schema validation.
    #[error("tool payload invalid: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Caller is not authorized.
    #[error("tool call unauthorized")]
    Unauthorized,
    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Downstream dependency failed.
    #[error("tool dependency error: {0}")]
    Dependency(String),
    /// Call exceeded its per-tool timeout.
    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),
    /// Circuit breaker rejected the call.
    #[error("tool circuit open")]
    CircuitOpen,
    /// Payload could not be serialized.
    #[error("tool payload serialization failed")]
    Serialization,
}

impl ToolError {
    /// Maps a store failure into a tool error.
    #[must_use]
    pub fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::NotFound(message),
            other => Self::Dependency(other.to_string()),
        }
    }

    /// Maps the failure into the shared taxonomy.
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) | Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) | Self::Serialization => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Auth,
            Self::Dependency(_) | Self::CircuitOpen => ErrorKind::Dependency,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Returns whether the client may retry the call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Dependency(_) | Self::Timeout(_))
    }
}

// ============================================================================
// SECTION: Invoker
// ============================================================================

/// Raw tool transport without resilience.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invokes one tool with a validated payload.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the call fails.
    async fn invoke(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError>;
}

/// In-process invoker validating against the registry and executing handlers.
pub struct LocalToolInvoker {
    /// Tool contract registry.
    registry: Arc<ToolRegistry>,
    /// Tool execution backends.
    handlers: Arc<ToolHandlers>,
}

impl LocalToolInvoker {
    /// Creates a local invoker.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>, handlers: Arc<ToolHandlers>) -> Self {
        Self {
            registry,
            handlers,
        }
    }
}

#[async_trait]
impl ToolInvoker for LocalToolInvoker {
    async fn invoke(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        self.registry.validate_input(name, &input).map_err(ToolError::Validation)?;
        let output = self.handlers.execute(name, input, context).await?;
        self.registry.validate_output(name, &output).map_err(ToolError::Validation)?;
        Ok(output)
    }
}

/// HTTP invoker calling a remote tool server's `/tools/call`.
pub struct HttpToolInvoker {
    /// Tool server base URL.
    base_url: String,
    /// Shared key sent on internal calls.
    internal_api_key: Option<String>,
    /// HTTP client.
    client: Client,
}

impl HttpToolInvoker {
    /// Creates an HTTP invoker.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Dependency`] when the HTTP client cannot be
    /// built.
    pub fn new(base_url: String, internal_api_key: Option<String>) -> Result<Self, ToolError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ToolError::Dependency(err.to_string()))?;
        Ok(Self {
            base_url,
            internal_api_key,
            client,
        })
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let body = json!({
            "tool_name": name,
            "input": input,
            "context": {
                "tenant_id": context.scope.tenant_id,
                "site_id": context.scope.site_id,
                "trace_id": context.trace_id,
                "span_id": context.span_id,
                "user_id": context.user_id,
                "session_id": context.session_id,
                "npc_id": context.npc_id,
            },
        });
        let url = format!("{}/tools/call", self.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .header("X-Tenant-ID", context.scope.tenant_id.as_str())
            .header("X-Site-ID", context.scope.site_id.as_str())
            .header("X-Trace-ID", context.trace_id.as_str())
            .json(&body);
        if let Some(key) = &self.internal_api_key {
            request = request.header("X-Internal-Key", key);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ToolError::Timeout(Duration::ZERO)
            } else {
                ToolError::Dependency(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let envelope: Value = response
            .json()
            .await
            .map_err(|err| ToolError::Dependency(err.to_string()))?;
        if envelope.get("success").and_then(Value::as_bool) == Some(true) {
            return Ok(envelope.get("output").cloned().unwrap_or(Value::Null));
        }
        let message = envelope
            .get("error")
            .and_then(Value::as_str)
            .map_or_else(|| format!("tool server status {status}"), str::to_string);
        match envelope.get("error_type").and_then(Value::as_str) {
            Some("not_found") => Err(ToolError::NotFound(message)),
            Some("validation") => Err(ToolError::Validation(vec![message])),
            Some("auth") => Err(ToolError::Unauthorized),
            Some("timeout") => Err(ToolError::Timeout(Duration::ZERO)),
            _ => Err(ToolError::Dependency(message)),
        }
    }
}

// ============================================================================
// SECTION: Resilient Client
// ============================================================================

/// Base backoff before the second attempt.
const BACKOFF_BASE_MS: u64 = 100;

/// Maximum jitter added to each backoff.
const BACKOFF_JITTER_MS: u64 = 50;

/// Tool client applying the per-tool resilience policy.
pub struct ResilientToolClient {
    /// Raw transport.
    invoker: Arc<dyn ToolInvoker>,
    /// Per-tool policy table.
    config: ToolsConfig,
    /// Breaker shared across calls.
    breaker: Arc<CircuitBreaker>,
    /// Audit sink for call records.
    audit_sink: Arc<dyn ToolAuditSink>,
    /// Durable audit rows.
    audit_store: Option<Arc<dyn ToolAuditStore>>,
}

impl ResilientToolClient {
    /// Creates a resilient client over a raw invoker.
    #[must_use]
    pub fn new(
        invoker: Arc<dyn ToolInvoker>,
        config: ToolsConfig,
        breaker: Arc<CircuitBreaker>,
        audit_sink: Arc<dyn ToolAuditSink>,
        audit_store: Option<Arc<dyn ToolAuditStore>>,
    ) -> Self {
        Self {
            invoker,
            config,
            breaker,
            audit_sink,
            audit_store,
        }
    }

    /// Calls a tool under the per-tool policy.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] when the circuit is open, every attempt fails,
    /// or the call is invalid.
    pub async fn call(
        &self,
        name: &str,
        input: Value,
        context: &ToolContext,
    ) -> Result<Value, ToolError> {
        let policy = self.config.policy_for(name);
        let timeout = Duration::from_millis(policy.timeout_ms);
        let key = CircuitBreaker::key(
            name,
            context.scope.tenant_id.as_str(),
            context.scope.site_id.as_str(),
        );

        if self.breaker.admit(&key).is_none() {
            self.record_audit(name, &input, context, ToolCallStatus::Failed, 0, 1, Some("dependency"));
            return Err(ToolError::CircuitOpen);
        }

        let started = Instant::now();
        let mut attempts = 0_u32;
        let mut last_error = ToolError::Dependency("tool call never attempted".to_string());
        while attempts < policy.max_attempts.max(1) {
            if attempts > 0 {
                tokio::time::sleep(backoff_delay(attempts)).await;
            }
            attempts += 1;
            let outcome =
                tokio::time::timeout(timeout, self.invoker.invoke(name, input.clone(), context))
                    .await;
            match outcome {
                Ok(Ok(output)) => {
                    self.breaker.record_success(&key);
                    let latency = elapsed_ms(started);
                    self.record_audit(
                        name,
                        &input,
                        context,
                        ToolCallStatus::Success,
                        latency,
                        attempts,
                        None,
                    );
                    return Ok(output);
                }
                Ok(Err(err)) => {
                    if !err.is_retryable() || attempts >= policy.max_attempts {
                        self.breaker.record_failure(&key);
                        let latency = elapsed_ms(started);
                        self.record_audit(
                            name,
                            &input,
                            context,
                            ToolCallStatus::Failed,
                            latency,
                            attempts,
                            Some(err.error_kind().as_str()),
                        );
                        return Err(err);
                    }
                    last_error = err;
                }
                Err(_) => {
                    if attempts >= policy.max_attempts {
                        self.breaker.record_failure(&key);
                        let latency = elapsed_ms(started);
                        self.record_audit(
                            name,
                            &input,
                            context,
                            ToolCallStatus::Timeout,
                            latency,
                            attempts,
                            Some("timeout"),
                        );
                        return Err(ToolError::Timeout(timeout));
                    }
                    last_error = ToolError::Timeout(timeout);
                }
            }
        }
        self.breaker.record_failure(&key);
        let latency = elapsed_ms(started);
        self.record_audit(
            name,
            &input,
            context,
            ToolCallStatus::Failed,
            latency,
            attempts,
            Some(last_error.error_kind().as_str()),
        );
        Err(last_error)
    }

    /// Emits the audit row for one call.
    fn record_audit(
        &self,
        name: &str,
        input: &Value,
        context: &ToolContext,
        status: ToolCallStatus,
        latency_ms: u64,
        attempts: u32,
        error_type: Option<&str>,
    ) {
        let audit = ToolCallAudit {
            id: Uuid::new_v4().to_string(),
            scope: context.scope.clone(),
            trace_id: context.trace_id.clone(),
            tool_name: name.to_string(),
            status,
            latency_ms,
            request_payload_hash: hash_canonical_json(input).unwrap_or_default(),
            error_type: error_type.map(str::to_string),
            attempts,
            created_at: context.now,
        };
        self.audit_sink.record(&audit);
        if let Some(store) = &self.audit_store {
            let _ = store.append_tool_audit(&audit);
        }
    }
}

/// Computes the backoff delay before the given retry attempt.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8);
    let base = BACKOFF_BASE_MS.saturating_mul(1_u64 << exponent);
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter))
}

/// Elapsed milliseconds since `started`.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
