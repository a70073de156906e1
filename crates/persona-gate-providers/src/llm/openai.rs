// persona-gate-providers/src/llm/openai.rs
// ============================================================================
// Module: OpenAI-Compatible Chat Provider
// Description: Chat completions client for OpenAI and Qwen endpoints.
// Purpose: Generate completions over the OpenAI-compatible wire format.
// Dependencies: persona-gate-core, reqwest, serde
// ============================================================================

//! ## Overview
//! One client serves every OpenAI-compatible endpoint; the provider name and
//! base URL distinguish OpenAI proper from Qwen's compatible mode. Responses
//! carry token usage and the finish reason; content-filter finishes are
//! surfaced as classified errors so the pipeline can refuse cleanly.

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

use crate::llm::ProviderBuildError;
use crate::llm::classify_status;
use crate::llm::classify_transport;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// One chat message on the wire.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    /// Message role.
    role: &'static str,
    /// Message content.
    content: &'a str,
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    /// Model name.
    model: &'a str,
    /// System and user messages.
    messages: Vec<WireMessage<'a>>,
    /// Sampling temperature.
    temperature: f64,
    /// Maximum completion tokens.
    max_tokens: u32,
}

/// Token usage block in the response.
#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    /// Prompt tokens consumed.
    #[serde(default)]
    prompt_tokens: u32,
    /// Completion tokens produced.
    #[serde(default)]
    completion_tokens: u32,
}

/// One completion choice.
#[derive(Debug, Deserialize)]
struct WireChoice {
    /// Generated message.
    message: WireChoiceMessage,
    /// Finish reason label.
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Message inside a completion choice.
#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    /// Generated content.
    #[serde(default)]
    content: String,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    /// Completion choices.
    choices: Vec<WireChoice>,
    /// Token usage.
    #[serde(default)]
    usage: WireUsage,
    /// Model that served the request.
    #[serde(default)]
    model: Option<String>,
}

/// Error envelope returned by OpenAI-compatible endpoints.
#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    /// Error payload.
    error: WireError,
}

/// Error payload.
#[derive(Debug, Deserialize)]
struct WireError {
    /// Human-readable message.
    #[serde(default)]
    message: String,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Chat provider for OpenAI-compatible endpoints.
pub struct OpenAiChatProvider {
    /// Provider label recorded on traces (`openai` or `qwen`).
    provider_name: &'static str,
    /// API base URL.
    api_base: String,
    /// Bearer API key.
    api_key: String,
    /// Model name.
    model: String,
    /// HTTP client with the per-call timeout applied.
    client: Client,
}

impl OpenAiChatProvider {
    /// Creates a provider against an OpenAI-compatible endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the HTTP client cannot be built.
    pub fn new(
        provider_name: &'static str,
        api_base: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderBuildError::Client(err.to_string()))?;
        Ok(Self {
            provider_name,
            api_base,
            api_key,
            model,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    fn provider_name(&self) -> &str {
        self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::new(classify_transport(&err), err.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response
                .json::<WireErrorEnvelope>()
                .await
                .map_or_else(|_| format!("http status {status}"), |envelope| envelope.error.message);
            return Err(LlmError::with_status(classify_status(status), message, status));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LlmError::new(LlmErrorKind::Unknown, err.to_string()))?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(LlmError::new(LlmErrorKind::Unknown, "response contained no choices"));
        };
        let finish_reason = choice.finish_reason.unwrap_or_else(|| "stop".to_string());
        if finish_reason == "content_filter" {
            return Err(LlmError::new(
                LlmErrorKind::ContentFilter,
                "completion stopped by provider content filter",
            ));
        }
        Ok(LlmResponse {
            text: choice.message.content,
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
            finish_reason,
            latency_ms,
        })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.api_base.trim_end_matches('/'));
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
