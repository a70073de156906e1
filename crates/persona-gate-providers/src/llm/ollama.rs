// persona-gate-providers/src/llm/ollama.rs
// ============================================================================
// Module: Ollama Chat Provider
// Description: Local Ollama daemon client.
// Purpose: Generate completions without any external dependency.
// Dependencies: persona-gate-core, reqwest, serde
// ============================================================================

//! ## Overview
//! Ollama serves local models over a small JSON API. Token accounting uses
//! the daemon's eval counts; the daemon has no auth, so health is just
//! reachability.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use persona_gate_core::LlmError;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::LlmProvider;
use persona_gate_core::LlmRequest;
use persona_gate_core::LlmResponse;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::llm::ProviderBuildError;
use crate::llm::classify_status;
use crate::llm::classify_transport;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Ollama generate request body.
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    /// Model name.
    model: &'a str,
    /// User prompt.
    prompt: &'a str,
    /// System prompt.
    system: &'a str,
    /// Disable streaming; one JSON body comes back.
    stream: bool,
    /// Generation options.
    options: serde_json::Value,
}

/// Ollama generate response body.
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    /// Generated text.
    #[serde(default)]
    response: String,
    /// Prompt tokens evaluated.
    #[serde(default)]
    prompt_eval_count: u32,
    /// Completion tokens evaluated.
    #[serde(default)]
    eval_count: u32,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Chat provider for a local Ollama daemon.
pub struct OllamaProvider {
    /// Daemon base URL.
    base_url: String,
    /// Model name.
    model: String,
    /// HTTP client with the per-call timeout applied.
    client: Client,
}

impl OllamaProvider {
    /// Creates an Ollama provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderBuildError::Client(err.to_string()))?;
        Ok(Self {
            base_url,
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: &request.user_message,
            system: &request.system_prompt,
            stream: false,
            options: json!({
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }),
        };
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::new(classify_transport(&err), err.to_string()))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(LlmError::with_status(
                classify_status(status),
                format!("ollama generate failed with status {status}"),
                status,
            ));
        }
        let generated: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|err| LlmError::new(LlmErrorKind::Unknown, err.to_string()))?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(LlmResponse {
            text: generated.response,
            model: self.model.clone(),
            prompt_tokens: generated.prompt_eval_count,
            completion_tokens: generated.eval_count,
            finish_reason: "stop".to_string(),
            latency_ms,
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
