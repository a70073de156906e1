// persona-gate-orchestrator/src/chat.rs
// ============================================================================
// Module: Chat Contract
// Description: Request and response types for one turn.
// Purpose: Shape the single operation the orchestrator exposes.
// Dependencies: persona-gate-core, serde
// ============================================================================

//! ## Overview
//! One operation: a chat request in, a shaped chat response out. The
//! response shape never varies with the outcome; refusals and conservative
//! answers carry the template text and an empty citation list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_core::Citation;
use persona_gate_core::ErrorKind;
use persona_gate_core::NpcId;
use persona_gate_core::PolicyMode;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::TraceId;
use persona_gate_core::UserId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Request
// ============================================================================

/// One user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Tenant and site the turn runs in.
    pub scope: Scope,
    /// NPC to answer.
    pub npc_id: NpcId,
    /// User query text.
    pub query: String,
    /// Session grouping multi-turn context; generated when absent.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// End user, when known.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Caller-supplied trace id; generated when absent.
    #[serde(default)]
    pub trace_id: Option<TraceId>,
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// The shaped answer for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Trace recorded for the turn.
    pub trace_id: TraceId,
    /// Session the turn belongs to.
    pub session_id: SessionId,
    /// Policy mode the gate decided.
    pub policy_mode: PolicyMode,
    /// Answer text.
    pub answer_text: String,
    /// Citations backing the answer; empty outside normal mode.
    pub citations: Vec<Citation>,
    /// Follow-up question suggestions.
    pub followup_questions: Vec<String>,
    /// Display name of the answering NPC.
    pub npc_name: Option<String>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// The only failures a caller ever sees from the pipeline.
///
/// Sub-component failures degrade inside the turn; these three cover a
/// missing persona, an unreachable persona source, and the overall
/// deadline.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The NPC profile or prompt does not exist in the scope.
    #[error("not found: {0}")]
    NotFound(String),
    /// The persona could not be resolved at all.
    #[error("persona unavailable: {0}")]
    Unavailable(String),
    /// The overall turn deadline was exceeded.
    #[error("turn deadline exceeded")]
    Timeout,
}

impl ChatError {
    /// Maps the failure into the shared taxonomy.
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) => ErrorKind::Dependency,
            Self::Timeout => ErrorKind::Timeout,
        }
    }
}
