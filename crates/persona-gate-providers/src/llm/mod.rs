// persona-gate-providers/src/llm/mod.rs
// ============================================================================
// Module: LLM Provider Implementations
// Description: Chat providers, the factory, and the shared retry helper.
// Purpose: Reach language model backends through one classified interface.
// Dependencies: persona-gate-config, persona-gate-core, tokio
// ============================================================================

//! ## Overview
//! Four chat backends implement [`LlmProvider`]: an OpenAI-compatible client
//! (serving both OpenAI and Qwen), Baidu ERNIE with its token exchange,
//! a local Ollama daemon, and a deterministic sandbox for tests. The retry
//! helper applies the platform policy: bounded attempts with exponential
//! backoff and jitter on retryable classes only.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod baidu;
pub mod ollama;
pub mod openai;
pub mod sandbox;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use persona_gate_config::LlmConfig;
use persona_gate_config::LlmProviderKind;
use persona_gate_core::LlmError;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::LlmProvider;
use persona_gate_core::LlmRequest;
use persona_gate_core::LlmResponse;
use rand::Rng;
use thiserror::Error;

pub use baidu::BaiduErnieProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiChatProvider;
pub use sandbox::SandboxProvider;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Base backoff before the second attempt.
const BACKOFF_BASE_MS: u64 = 200;

/// Maximum jitter added to each backoff.
const BACKOFF_JITTER_MS: u64 = 100;

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Errors raised while constructing a provider.
#[derive(Debug, Error)]
pub enum ProviderBuildError {
    /// The HTTP client could not be constructed.
    #[error("provider client build failed: {0}")]
    Client(String),
}

/// Builds the configured LLM provider.
///
/// Qwen speaks the OpenAI-compatible wire, so both `openai` and `qwen`
/// resolve to the same client pointed at different endpoints.
///
/// # Errors
///
/// Returns [`ProviderBuildError`] when the backing client cannot be built.
pub fn build_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, ProviderBuildError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let provider: Arc<dyn LlmProvider> = match config.provider {
        LlmProviderKind::Openai => Arc::new(OpenAiChatProvider::new(
            "openai",
            config.openai.api_base.clone(),
            config.openai.api_key.clone(),
            config.openai.model.clone(),
            timeout,
        )?),
        LlmProviderKind::Qwen => Arc::new(OpenAiChatProvider::new(
            "qwen",
            config.qwen.api_base.clone(),
            config.qwen.api_key.clone(),
            config.qwen.model.clone(),
            timeout,
        )?),
        LlmProviderKind::Baidu => Arc::new(BaiduErnieProvider::new(
            config.baidu.api_key.clone(),
            config.baidu.secret_key.clone(),
            config.baidu.model.clone(),
            timeout,
        )?),
        LlmProviderKind::Ollama => Arc::new(OllamaProvider::new(
            config.ollama.base_url.clone(),
            config.ollama.model.clone(),
            timeout,
        )?),
        LlmProviderKind::Sandbox => Arc::new(SandboxProvider::new()),
    };
    Ok(provider)
}

// ============================================================================
// SECTION: Retry Helper
// ============================================================================

/// Generates a completion with bounded retries on retryable failures.
///
/// Non-retryable classes (auth, invalid request, content filter) surface
/// immediately. Backoff doubles per attempt with random jitter.
///
/// # Errors
///
/// Returns the last [`LlmError`] once the attempt budget is exhausted.
pub async fn generate_with_retry(
    provider: &dyn LlmProvider,
    request: &LlmRequest,
    max_attempts: u32,
) -> Result<LlmResponse, LlmError> {
    let attempts = max_attempts.max(1);
    let mut last_error =
        LlmError::new(LlmErrorKind::Unknown, "llm call never attempted".to_string());
    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
        match provider.generate(request).await {
            Ok(response) => return Ok(response),
            Err(err) if err.kind.is_retryable() && attempt + 1 < attempts => {
                last_error = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error)
}

/// Computes the backoff delay before the given retry attempt.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(8);
    let base = BACKOFF_BASE_MS.saturating_mul(1_u64 << exponent);
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    Duration::from_millis(base.saturating_add(jitter))
}

// ============================================================================
// SECTION: Status Classification
// ============================================================================

/// Classifies an HTTP status into an LLM failure category.
#[must_use]
pub(crate) fn classify_status(status: u16) -> LlmErrorKind {
    match status {
        401 | 403 => LlmErrorKind::Auth,
        408 => LlmErrorKind::Timeout,
        429 => LlmErrorKind::RateLimit,
        400..=499 => LlmErrorKind::InvalidRequest,
        500..=599 => LlmErrorKind::Server,
        _ => LlmErrorKind::Unknown,
    }
}

/// Classifies a reqwest transport failure.
#[must_use]
pub(crate) fn classify_transport(err: &reqwest::Error) -> LlmErrorKind {
    if err.is_timeout() {
        LlmErrorKind::Timeout
    } else {
        LlmErrorKind::Network
    }
}
