// persona-gate-providers/src/llm/sandbox.rs
// ============================================================================
// Module: Sandbox Chat Provider
// Description: Deterministic in-process provider for tests and development.
// Purpose: Exercise the full pipeline without a model backend.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! The sandbox provider echoes a deterministic answer derived from the user
//! message. It can be scripted to fail with a chosen error class so retry
//! and degrade paths are testable without a network.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use async_trait::async_trait;
use persona_gate_core::LlmError;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::LlmProvider;
use persona_gate_core::LlmRequest;
use persona_gate_core::LlmResponse;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Deterministic sandbox provider.
#[derive(Default)]
pub struct SandboxProvider {
    /// Scripted failures returned before any success, front first.
    scripted_failures: Mutex<Vec<LlmErrorKind>>,
}

impl SandboxProvider {
    /// Creates a sandbox provider that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sandbox provider that fails with the given kinds first.
    #[must_use]
    pub fn with_failures(kinds: Vec<LlmErrorKind>) -> Self {
        Self {
            scripted_failures: Mutex::new(kinds),
        }
    }
}

#[async_trait]
impl LlmProvider for SandboxProvider {
    fn provider_name(&self) -> &str {
        "sandbox"
    }

    fn model_name(&self) -> &str {
        "sandbox-echo"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Ok(mut failures) = self.scripted_failures.lock()
            && !failures.is_empty()
        {
            let kind = failures.remove(0);
            return Err(LlmError::new(kind, "scripted sandbox failure"));
        }
        let text = format!("[sandbox] {}", request.user_message);
        let completion_tokens = u32::try_from(text.split_whitespace().count()).unwrap_or(0);
        Ok(LlmResponse {
            text,
            model: "sandbox-echo".to_string(),
            prompt_tokens: u32::try_from(request.system_prompt.split_whitespace().count())
                .unwrap_or(0),
            completion_tokens,
            finish_reason: "stop".to_string(),
            latency_ms: 0,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
