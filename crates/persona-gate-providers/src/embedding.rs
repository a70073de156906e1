// persona-gate-providers/src/embedding.rs
// ============================================================================
// Module: Embedding Providers
// Description: OpenAI embedding client and the usage-auditing wrapper.
// Purpose: Embed queries and evidence with per-call spend accounting.
// Dependencies: persona-gate-core, reqwest, serde
// ============================================================================

//! ## Overview
//! The OpenAI embedding client produces query vectors for the qdrant
//! strategy. The auditing wrapper records one usage row per call (provider,
//! model, dimensions, input size, estimated cost, latency, outcome) so
//! embedding spend and dedup effectiveness stay observable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use persona_gate_core::EmbeddingCallStatus;
use persona_gate_core::EmbeddingProvider;
use persona_gate_core::EmbeddingUsage;
use persona_gate_core::LlmError;
use persona_gate_core::LlmErrorKind;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use persona_gate_core::UsageStore;
use persona_gate_core::sha256_hex;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::llm::ProviderBuildError;
use crate::llm::classify_status;
use crate::llm::classify_transport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Rough characters-per-token estimate used for spend accounting.
const CHARS_PER_TOKEN: u32 = 4;

/// Estimated cost per thousand embedding tokens in USD.
const COST_PER_1K_TOKENS_USD: f64 = 0.000_02;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Embedding request body.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    /// Model name.
    model: &'a str,
    /// Input text.
    input: &'a str,
}

/// One embedding datum.
#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    /// Vector values.
    embedding: Vec<f32>,
}

/// Embedding response body.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    /// Embedding data.
    data: Vec<EmbeddingDatum>,
}

// ============================================================================
// SECTION: OpenAI Embedding Provider
// ============================================================================

/// Embedding client for OpenAI-compatible endpoints.
pub struct OpenAiEmbeddingProvider {
    /// API base URL.
    api_base: String,
    /// Bearer API key.
    api_key: String,
    /// Model name.
    model: String,
    /// Vector dimension the model produces.
    dimension: usize,
    /// HTTP client with the per-call timeout applied.
    client: Client,
}

impl OpenAiEmbeddingProvider {
    /// Creates an embedding provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the HTTP client cannot be built.
    pub fn new(
        api_base: String,
        api_key: String,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderBuildError::Client(err.to_string()))?;
        Ok(Self {
            api_base,
            api_key,
            model,
            dimension,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let url = format!("{}/embeddings", self.api_base.trim_end_matches('/'));
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
            return Err(LlmError::with_status(
                classify_status(status),
                format!("embedding call failed with status {status}"),
                status,
            ));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| LlmError::new(LlmErrorKind::Unknown, err.to_string()))?;
        let Some(datum) = parsed.data.into_iter().next() else {
            return Err(LlmError::new(LlmErrorKind::Unknown, "embedding response was empty"));
        };
        Ok(datum.embedding)
    }
}

// ============================================================================
// SECTION: Auditing Wrapper
// ============================================================================

/// Embedding provider wrapper that records one usage row per call.
pub struct AuditedEmbeddingProvider {
    /// Wrapped provider.
    inner: Arc<dyn EmbeddingProvider>,
    /// Usage row sink.
    usage: Arc<dyn UsageStore>,
    /// Scope usage rows are attributed to.
    scope: Scope,
}

impl AuditedEmbeddingProvider {
    /// Wraps a provider with usage accounting.
    #[must_use]
    pub fn new(inner: Arc<dyn EmbeddingProvider>, usage: Arc<dyn UsageStore>, scope: Scope) -> Self {
        Self {
            inner,
            usage,
            scope,
        }
    }

    /// Builds the usage row for one call.
    fn usage_row(
        &self,
        text: &str,
        status: EmbeddingCallStatus,
        latency_ms: u64,
        now: Timestamp,
    ) -> EmbeddingUsage {
        let input_chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        let estimated_tokens = input_chars.div_ceil(CHARS_PER_TOKEN);
        EmbeddingUsage {
            id: Uuid::new_v4().to_string(),
            scope: self.scope.clone(),
            object_type: "query".to_string(),
            object_id: String::new(),
            provider: self.inner.provider_name().to_string(),
            model: self.inner.model_name().to_string(),
            embedding_dim: u32::try_from(self.inner.dimension()).unwrap_or(0),
            input_chars,
            estimated_tokens,
            cost_estimate: f64::from(estimated_tokens) / 1_000.0 * COST_PER_1K_TOKENS_USD,
            latency_ms,
            status,
            content_hash: sha256_hex(text.as_bytes()),
            created_at: now,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for AuditedEmbeddingProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let started = Instant::now();
        let result = self.inner.embed(text).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = match &result {
            Ok(_) => EmbeddingCallStatus::Success,
            Err(err) if err.kind == LlmErrorKind::RateLimit => EmbeddingCallStatus::RateLimited,
            Err(_) => EmbeddingCallStatus::Failed,
        };
        let now = Timestamp::from_unix_millis(
            i64::try_from(
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis(),
            )
            .unwrap_or(0),
        );
        let row = self.usage_row(text, status, latency_ms, now);
        let _ = self.usage.append_embedding_usage(&row);
        result
    }
}
