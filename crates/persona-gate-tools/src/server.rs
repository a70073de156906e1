// persona-gate-tools/src/server.rs
// ============================================================================
// Module: Tool Server
// Description: HTTP surface for tools/list and tools/call.
// Purpose: Expose the tool plane with context headers and schema validation.
// Dependencies: axum, persona-gate-core, tokio
// ============================================================================

//! ## Overview
//! The tool server exposes `POST /tools/list` and `POST /tools/call` plus
//! the health probes. Every call requires `X-Tenant-ID` and `X-Site-ID`;
//! `X-Trace-ID` is generated when absent. When an internal key is
//! configured, `tools/call` additionally verifies it. Inputs and outputs
//! are schema-validated on both ends; responses always carry the audit
//! block so callers can correlate with the ledger.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use persona_gate_core::ErrorKind;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use persona_gate_core::hash_canonical_json;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::client::ToolContext;
use crate::client::ToolError;
use crate::handlers::ToolHandlers;
use crate::registry::ToolRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while serving the tool plane.
#[derive(Debug, Error)]
pub enum ToolServerError {
    /// The listener could not bind or serve.
    #[error("tool server io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Body of `POST /tools/list`.
#[derive(Debug, Default, Deserialize)]
struct ToolsListRequest {
    /// Restricts to one category, when set.
    #[serde(default)]
    category: Option<String>,
    /// Returns only tools the model may call autonomously.
    #[serde(default)]
    ai_callable_only: bool,
}

/// Body of `POST /tools/call`.
#[derive(Debug, Deserialize)]
struct ToolsCallRequest {
    /// Tool name to invoke.
    tool_name: String,
    /// Tool input payload.
    #[serde(default)]
    input: Value,
}

/// Audit block returned with every call response.
#[derive(Debug, Serialize)]
struct CallAuditBlock {
    /// Trace the call ran under.
    trace_id: String,
    /// Tool name invoked.
    tool_name: String,
    /// Terminal status label.
    status: &'static str,
    /// Call latency in milliseconds.
    latency_ms: u64,
    /// Canonical hash of the request payload.
    request_payload_hash: String,
}

/// Envelope of `POST /tools/call`.
#[derive(Debug, Serialize)]
struct ToolsCallResponse {
    /// Whether the call succeeded.
    success: bool,
    /// Tool output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Classified error label on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<&'static str>,
    /// Audit block for ledger correlation.
    audit: CallAuditBlock,
}

// ============================================================================
// SECTION: Server State
// ============================================================================

/// Shared state behind the router.
pub struct ToolServerState {
    /// Tool contract registry.
    pub registry: Arc<ToolRegistry>,
    /// Tool execution backends.
    pub handlers: Arc<ToolHandlers>,
    /// Shared key verified on `tools/call`, when configured.
    pub internal_api_key: Option<String>,
}

/// HTTP tool server.
pub struct ToolServer {
    /// Shared router state.
    state: Arc<ToolServerState>,
}

impl ToolServer {
    /// Creates a server over the given state.
    #[must_use]
    pub const fn new(state: Arc<ToolServerState>) -> Self {
        Self {
            state,
        }
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/tools/list", post(tools_list))
            .route("/tools/call", post(tools_call))
            .route("/healthz", get(health))
            .route("/readyz", get(health))
            .route("/livez", get(health))
            .with_state(Arc::clone(&self.state))
    }

    /// Serves the router on the given address until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ToolServerError`] when binding or serving fails.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), ToolServerError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ToolServerError::Io(err.to_string()))?;
        axum::serve(listener, self.router())
            .await
            .map_err(|err| ToolServerError::Io(err.to_string()))
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Health probe handler.
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `POST /tools/list` handler.
async fn tools_list(
    State(state): State<Arc<ToolServerState>>,
    headers: HeaderMap,
    Json(request): Json<ToolsListRequest>,
) -> Response {
    if let Err(response) = require_scope(&headers) {
        return response;
    }
    let tools: Vec<_> =
        state.registry.list(request.category.as_deref(), request.ai_callable_only);
    Json(json!({"tools": tools})).into_response()
}

/// `POST /tools/call` handler.
async fn tools_call(
    State(state): State<Arc<ToolServerState>>,
    headers: HeaderMap,
    Json(request): Json<ToolsCallRequest>,
) -> Response {
    let scope = match require_scope(&headers) {
        Ok(scope) => scope,
        Err(response) => return response,
    };
    if let Some(expected) = &state.internal_api_key {
        let supplied = header_value(&headers, "X-Internal-Key");
        if supplied.as_deref() != Some(expected.as_str()) {
            return error_response(ErrorKind::Auth, "internal key missing or invalid");
        }
    }
    let trace_id = header_value(&headers, "X-Trace-ID")
        .map_or_else(|| TraceId::new(Uuid::new_v4().to_string()), TraceId::new);

    let context = ToolContext {
        scope,
        trace_id: trace_id.clone(),
        span_id: None,
        user_id: None,
        session_id: None,
        npc_id: None,
        now: now_timestamp(),
    };
    let payload_hash = hash_canonical_json(&request.input).unwrap_or_default();
    let started = std::time::Instant::now();

    let result = match state.registry.validate_input(&request.tool_name, &request.input) {
        Err(errors) => Err(ToolError::Validation(errors)),
        Ok(()) => {
            match state.handlers.execute(&request.tool_name, request.input, &context).await {
                Ok(output) => state
                    .registry
                    .validate_output(&request.tool_name, &output)
                    .map_err(ToolError::Validation)
                    .map(|()| output),
                Err(err) => Err(err),
            }
        }
    };
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(output) => Json(ToolsCallResponse {
            success: true,
            output: Some(output),
            error: None,
            error_type: None,
            audit: CallAuditBlock {
                trace_id: trace_id.to_string(),
                tool_name: request.tool_name,
                status: "success",
                latency_ms,
                request_payload_hash: payload_hash,
            },
        })
        .into_response(),
        Err(err) => {
            let kind = err.error_kind();
            let status =
                StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = Json(ToolsCallResponse {
                success: false,
                output: None,
                error: Some(err.to_string()),
                error_type: Some(kind.as_str()),
                audit: CallAuditBlock {
                    trace_id: trace_id.to_string(),
                    tool_name: request.tool_name,
                    status: "failed",
                    latency_ms,
                    request_payload_hash: payload_hash,
                },
            });
            (status, body).into_response()
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts a header value as a string.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// Requires the tenant and site headers, returning the scope.
fn require_scope(headers: &HeaderMap) -> Result<Scope, Response> {
    let tenant = header_value(headers, "X-Tenant-ID");
    let site = header_value(headers, "X-Site-ID");
    match (tenant, site) {
        (Some(tenant), Some(site)) if !tenant.is_empty() && !site.is_empty() => {
            Ok(Scope::new(tenant, site))
        }
        _ => Err(error_response(
            ErrorKind::Validation,
            "X-Tenant-ID and X-Site-ID headers are required",
        )),
    }
}

/// Builds a taxonomy-mapped error response.
fn error_response(kind: ErrorKind, message: &str) -> Response {
    let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    let body = Json(json!({
        "code": kind.as_str(),
        "message": message,
    }));
    (status, body).into_response()
}

/// Current wall-clock time as a platform timestamp.
fn now_timestamp() -> Timestamp {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Timestamp::from_unix_millis(i64::try_from(millis).unwrap_or(0))
}
