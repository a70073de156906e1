// persona-gate-providers/src/llm/baidu.rs
// ============================================================================
// Module: Baidu ERNIE Chat Provider
// Description: ERNIE chat client with OAuth token exchange.
// Purpose: Generate completions through Baidu's qianfan endpoints.
// Dependencies: persona-gate-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! ERNIE authenticates with an access token exchanged from the API key and
//! secret key. Tokens are cached until shortly before expiry and refreshed
//! under a lock so concurrent turns share one exchange. ERNIE reports some
//! failures inside a 200 response; those are reclassified from the embedded
//! error code.

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
use tokio::sync::Mutex;

use crate::llm::ProviderBuildError;
use crate::llm::classify_status;
use crate::llm::classify_transport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// OAuth token endpoint.
const TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";

/// Chat endpoint prefix; the model name is appended.
const CHAT_URL_PREFIX: &str =
    "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/";

/// Safety margin subtracted from the reported token lifetime.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// ERNIE error code for rate limiting.
const ERNIE_RATE_LIMIT_CODE: i64 = 18;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Token exchange response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Bearer access token.
    access_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    expires_in: u64,
    /// Error label on failure.
    #[serde(default)]
    error: Option<String>,
}

/// One ERNIE chat message.
#[derive(Debug, Serialize)]
struct ErnieMessage<'a> {
    /// Message role.
    role: &'static str,
    /// Message content.
    content: &'a str,
}

/// ERNIE chat request body; the system prompt is a top-level field.
#[derive(Debug, Serialize)]
struct ErnieChatRequest<'a> {
    /// Conversation messages (user turns only).
    messages: Vec<ErnieMessage<'a>>,
    /// System prompt.
    system: &'a str,
    /// Sampling temperature.
    temperature: f64,
    /// Maximum completion tokens.
    max_output_tokens: u32,
}

/// Token usage block.
#[derive(Debug, Default, Deserialize)]
struct ErnieUsage {
    /// Prompt tokens consumed.
    #[serde(default)]
    prompt_tokens: u32,
    /// Completion tokens produced.
    #[serde(default)]
    completion_tokens: u32,
}

/// ERNIE chat response body.
#[derive(Debug, Deserialize)]
struct ErnieChatResponse {
    /// Generated text.
    #[serde(default)]
    result: Option<String>,
    /// Token usage.
    #[serde(default)]
    usage: ErnieUsage,
    /// Embedded error code (failures can arrive inside a 200).
    #[serde(default)]
    error_code: Option<i64>,
    /// Embedded error message.
    #[serde(default)]
    error_msg: Option<String>,
    /// Whether the answer was truncated by the safety system.
    #[serde(default)]
    need_clear_history: Option<bool>,
}

// ============================================================================
// SECTION: Token Cache
// ============================================================================

/// Cached access token.
struct CachedToken {
    /// Bearer token value.
    value: String,
    /// Instant the token stops being usable.
    valid_until: Instant,
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Chat provider for Baidu ERNIE.
pub struct BaiduErnieProvider {
    /// API key for the token exchange.
    api_key: String,
    /// Secret key for the token exchange.
    secret_key: String,
    /// Model name appended to the chat endpoint.
    model: String,
    /// HTTP client with the per-call timeout applied.
    client: Client,
    /// Cached access token shared across turns.
    token: Mutex<Option<CachedToken>>,
}

impl BaiduErnieProvider {
    /// Creates an ERNIE provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderBuildError`] when the HTTP client cannot be built.
    pub fn new(
        api_key: String,
        secret_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderBuildError::Client(err.to_string()))?;
        Ok(Self {
            api_key,
            secret_key,
            model,
            client,
            token: Mutex::new(None),
        })
    }

    /// Returns a live access token, exchanging a fresh one when needed.
    async fn access_token(&self) -> Result<String, LlmError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.valid_until > Instant::now()
        {
            return Ok(token.value.clone());
        }
        let response = self
            .client
            .post(TOKEN_URL)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.secret_key.as_str()),
            ])
            .send()
            .await
            .map_err(|err| LlmError::new(classify_transport(&err), err.to_string()))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(LlmError::with_status(
                classify_status(status),
                format!("token exchange failed with status {status}"),
                status,
            ));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| LlmError::new(LlmErrorKind::Unknown, err.to_string()))?;
        if let Some(error) = token.error {
            return Err(LlmError::new(
                LlmErrorKind::Auth,
                format!("token exchange rejected: {error}"),
            ));
        }
        let Some(value) = token.access_token else {
            return Err(LlmError::new(LlmErrorKind::Auth, "token exchange returned no token"));
        };
        let lifetime = Duration::from_secs(token.expires_in)
            .checked_sub(TOKEN_EXPIRY_MARGIN)
            .unwrap_or(Duration::ZERO);
        *cached = Some(CachedToken {
            value: value.clone(),
            valid_until: Instant::now() + lifetime,
        });
        Ok(value)
    }
}

#[async_trait]
impl LlmProvider for BaiduErnieProvider {
    fn provider_name(&self) -> &str {
        "baidu"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let token = self.access_token().await?;
        let body = ErnieChatRequest {
            messages: vec![ErnieMessage {
                role: "user",
                content: &request.user_message,
            }],
            system: &request.system_prompt,
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
        };
        let url = format!("{CHAT_URL_PREFIX}{}", self.model);
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .query(&[("access_token", token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::new(classify_transport(&err), err.to_string()))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(LlmError::with_status(
                classify_status(status),
                format!("ernie chat failed with status {status}"),
                status,
            ));
        }
        let chat: ErnieChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::new(LlmErrorKind::Unknown, err.to_string()))?;
        if let Some(code) = chat.error_code {
            let kind = if code == ERNIE_RATE_LIMIT_CODE {
                LlmErrorKind::RateLimit
            } else {
                LlmErrorKind::Server
            };
            return Err(LlmError::new(
                kind,
                chat.error_msg.unwrap_or_else(|| format!("ernie error code {code}")),
            ));
        }
        if chat.need_clear_history == Some(true) {
            return Err(LlmError::new(
                LlmErrorKind::ContentFilter,
                "ernie flagged the conversation for safety",
            ));
        }
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let Some(text) = chat.result else {
            return Err(LlmError::new(LlmErrorKind::Unknown, "ernie returned no result"));
        };
        Ok(LlmResponse {
            text,
            model: self.model.clone(),
            prompt_tokens: chat.usage.prompt_tokens,
            completion_tokens: chat.usage.completion_tokens,
            finish_reason: "stop".to_string(),
            latency_ms,
        })
    }

    async fn health_check(&self) -> bool {
        self.access_token().await.is_ok()
    }
}
