// persona-gate-config/src/config.rs
// ============================================================================
// Module: Persona Gate Configuration Model
// Description: Typed configuration with TOML loading and env overrides.
// Purpose: Make every dial explicit, validated, and loaded at start.
// Dependencies: persona-gate-core, serde, toml, url
// ============================================================================

//! ## Overview
//! All dials (timeouts, retrieval weights, TTLs, SLA hours, cache prefixes)
//! are explicit config values loaded at start. Secrets come from the
//! environment and never from the config file. Validation fails closed: a
//! config that does not validate never reaches a running server.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use persona_gate_core::RetrievalStrategy;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "PERSONA_GATE_CONFIG";

/// Default config file name resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "persona-gate.toml";

/// Maximum accepted config file size in bytes.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config failed validation.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Inbound HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Bind address for the tool server.
    pub bind_addr: String,
    /// Shared key required on internal-only endpoints.
    pub internal_api_key: Option<String>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8001".to_string(),
            internal_api_key: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Validates the server section.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid("server.bind_addr must be host:port".to_string()))?;
        if let Some(key) = &self.internal_api_key
            && key.len() < 16
        {
            return Err(ConfigError::Invalid(
                "server.internal_api_key must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store and Cache
// ============================================================================

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    /// Path of the sqlite database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("persona-gate.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Cache namespace configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Deployment-wide cache key prefix.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "persona-gate".to_string(),
        }
    }
}

/// Session memory caps.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MemoryConfig {
    /// Whether session memory is read and written at all.
    pub enabled: bool,
    /// Maximum messages retained per session.
    pub max_messages: usize,
    /// Maximum total characters retained per session.
    pub max_chars: usize,
    /// Time to live of one session's memory in seconds.
    pub ttl_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: 10,
            max_chars: 4_000,
            ttl_seconds: 86_400,
        }
    }
}

impl MemoryConfig {
    /// Validates the memory section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages == 0 {
            return Err(ConfigError::Invalid(
                "memory.max_messages must be greater than zero".to_string(),
            ));
        }
        if self.max_chars == 0 {
            return Err(ConfigError::Invalid(
                "memory.max_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Retrieval
// ============================================================================

/// Qdrant endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QdrantConfig {
    /// Qdrant REST endpoint.
    pub url: String,
    /// Collection holding evidence vectors.
    pub collection: String,
    /// Optional API key.
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "persona_gate_evidence".to_string(),
            api_key: None,
        }
    }
}

/// Retrieval strategy defaults applied when no release overrides them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrievalConfig {
    /// Default strategy.
    pub strategy: RetrievalStrategy,
    /// Default citations per turn.
    pub top_k: u32,
    /// Default minimum strategy score.
    pub min_score: f64,
    /// Trigram weight in hybrid fusion.
    pub trgm_weight: f64,
    /// Vector weight in hybrid fusion.
    pub qdrant_weight: f64,
    /// Candidate rows fetched per strategy before ranking.
    pub candidate_limit: usize,
    /// Qdrant endpoint.
    pub qdrant: QdrantConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Hybrid,
            top_k: 5,
            min_score: 0.3,
            trgm_weight: 0.4,
            qdrant_weight: 0.6,
            candidate_limit: 200,
            qdrant: QdrantConfig::default(),
        }
    }
}

impl RetrievalConfig {
    /// Validates the retrieval section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > 50 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be between 1 and 50".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::Invalid(
                "retrieval.min_score must be within [0, 1]".to_string(),
            ));
        }
        if self.trgm_weight < 0.0 || self.qdrant_weight < 0.0 {
            return Err(ConfigError::Invalid(
                "retrieval weights must be non-negative".to_string(),
            ));
        }
        if self.trgm_weight + self.qdrant_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "retrieval weights must not both be zero".to_string(),
            ));
        }
        Url::parse(&self.qdrant.url)
            .map_err(|_| ConfigError::Invalid("retrieval.qdrant.url must be a url".to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: LLM Providers
// ============================================================================

/// Selectable LLM backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// Baidu ERNIE.
    Baidu,
    /// OpenAI chat completions.
    Openai,
    /// Qwen through its OpenAI-compatible endpoint.
    Qwen,
    /// Local Ollama.
    Ollama,
    /// Deterministic sandbox provider for tests and development.
    #[default]
    Sandbox,
}

/// OpenAI endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OpenAiConfig {
    /// API key.
    pub api_key: String,
    /// API base URL.
    pub api_base: String,
    /// Model name.
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        }
    }
}

/// Baidu ERNIE endpoint configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BaiduConfig {
    /// API key.
    pub api_key: String,
    /// Secret key exchanged for access tokens.
    pub secret_key: String,
    /// Model name.
    pub model: String,
}

/// Qwen endpoint configuration (OpenAI-compatible wire).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QwenConfig {
    /// API key.
    pub api_key: String,
    /// API base URL.
    pub api_base: String,
    /// Model name.
    pub model: String,
}

impl Default for QwenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            model: "qwen-max".to_string(),
        }
    }
}

/// Ollama endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OllamaConfig {
    /// Base URL of the local daemon.
    pub base_url: String,
    /// Model name.
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// Embedding model name.
    pub model: String,
    /// Vector dimension the model produces.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1_536,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    /// Selected backend.
    pub provider: LlmProviderKind,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum attempts per call (first try plus retries).
    pub max_attempts: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// OpenAI endpoint settings.
    pub openai: OpenAiConfig,
    /// Baidu endpoint settings.
    pub baidu: BaiduConfig,
    /// Qwen endpoint settings.
    pub qwen: QwenConfig,
    /// Ollama endpoint settings.
    pub ollama: OllamaConfig,
    /// Embedding settings.
    pub embedding: EmbeddingConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Sandbox,
            timeout_ms: 60_000,
            max_attempts: 3,
            temperature: 0.7,
            max_tokens: 1_000,
            openai: OpenAiConfig::default(),
            baidu: BaiduConfig::default(),
            qwen: QwenConfig::default(),
            ollama: OllamaConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Validates the llm section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > 3 {
            return Err(ConfigError::Invalid(
                "llm.max_attempts must be between 1 and 3".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(
                "llm.temperature must be within [0, 2]".to_string(),
            ));
        }
        match self.provider {
            LlmProviderKind::Openai if self.openai.api_key.is_empty() => Err(
                ConfigError::Invalid("llm.openai.api_key must be set for openai".to_string()),
            ),
            LlmProviderKind::Qwen if self.qwen.api_key.is_empty() => Err(ConfigError::Invalid(
                "llm.qwen.api_key must be set for qwen".to_string(),
            )),
            LlmProviderKind::Baidu
                if self.baidu.api_key.is_empty() || self.baidu.secret_key.is_empty() =>
            {
                Err(ConfigError::Invalid(
                    "llm.baidu.api_key and llm.baidu.secret_key must be set for baidu".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Intent Classification
// ============================================================================

/// Intent classifier configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IntentConfig {
    /// Whether the LLM classifier runs in front of the rule classifier.
    pub use_llm: bool,
    /// Classifier cache TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// Classifier timeout in milliseconds before falling back to rules.
    pub timeout_ms: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            use_llm: false,
            cache_ttl_seconds: 300,
            timeout_ms: 2_000,
        }
    }
}

// ============================================================================
// SECTION: Tool Plane
// ============================================================================

/// Per-tool resilience dials.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolPolicyConfig {
    /// Scheduling priority (lower runs first when contended).
    pub priority: u32,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum attempts per call (first try plus retries).
    pub max_attempts: u32,
    /// Consecutive failures that open the circuit breaker.
    pub circuit_breaker_threshold: u32,
    /// Breaker cool-down before a half-open probe, in milliseconds.
    pub breaker_cooldown_ms: u64,
}

impl Default for ToolPolicyConfig {
    fn default() -> Self {
        Self {
            priority: 10,
            timeout_ms: 5_000,
            max_attempts: 3,
            circuit_breaker_threshold: 5,
            breaker_cooldown_ms: 30_000,
        }
    }
}

/// Tool plane configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ToolsConfig {
    /// Per-tool overrides keyed by tool name.
    pub policies: BTreeMap<String, ToolPolicyConfig>,
    /// Policy applied to tools without an override.
    pub default_policy: ToolPolicyConfig,
}

impl ToolsConfig {
    /// Returns the effective policy for a tool.
    #[must_use]
    pub fn policy_for(&self, tool_name: &str) -> &ToolPolicyConfig {
        self.policies.get(tool_name).unwrap_or(&self.default_policy)
    }

    /// Validates the tools section.
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, policy) in
            self.policies.iter().chain(std::iter::once((&String::new(), &self.default_policy)))
        {
            let label = if name.is_empty() { "default_policy" } else { name.as_str() };
            if policy.max_attempts == 0 || policy.max_attempts > 3 {
                return Err(ConfigError::Invalid(format!(
                    "tools.{label}.max_attempts must be between 1 and 3"
                )));
            }
            if policy.timeout_ms < 100 || policy.timeout_ms > 60_000 {
                return Err(ConfigError::Invalid(format!(
                    "tools.{label}.timeout_ms must be between 100 and 60000"
                )));
            }
            if policy.circuit_breaker_threshold == 0 {
                return Err(ConfigError::Invalid(format!(
                    "tools.{label}.circuit_breaker_threshold must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy, Feedback, Alerts
// ============================================================================

/// Evidence-gate policy loader configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PolicySectionConfig {
    /// Policy name the platform runs under.
    pub name: String,
    /// Loader snapshot TTL in seconds.
    pub cache_ttl_seconds: u64,
    /// Optional seed file imported when the store is empty.
    pub seed_path: Option<PathBuf>,
}

impl Default for PolicySectionConfig {
    fn default() -> Self {
        Self {
            name: "evidence-gate".to_string(),
            cache_ttl_seconds: 60,
            seed_path: None,
        }
    }
}

/// Feedback workflow configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FeedbackConfig {
    /// Routing rules file, hot-reloaded on a TTL.
    pub routing_rules_path: Option<PathBuf>,
    /// Routing rules cache TTL in seconds.
    pub routing_cache_ttl_seconds: u64,
    /// Group applied when no rule matches.
    pub default_group: String,
    /// SLA hours applied when no rule matches.
    pub default_sla_hours: i64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            routing_rules_path: None,
            routing_cache_ttl_seconds: 300,
            default_group: "support".to_string(),
            default_sla_hours: 24,
        }
    }
}

impl FeedbackConfig {
    /// Validates the feedback section.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_sla_hours <= 0 {
            return Err(ConfigError::Invalid(
                "feedback.default_sla_hours must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Alert evaluation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlertsConfig {
    /// Rule set file (YAML).
    pub rules_path: Option<PathBuf>,
    /// Webhook URL notified for new high and critical firings.
    pub webhook_url: Option<String>,
    /// Evaluation interval in seconds.
    pub evaluate_interval_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules_path: None,
            webhook_url: None,
            evaluate_interval_seconds: 300,
        }
    }
}

impl AlertsConfig {
    /// Validates the alerts section.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.webhook_url {
            Url::parse(url)
                .map_err(|_| ConfigError::Invalid("alerts.webhook_url must be a url".to_string()))?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root Persona Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PersonaGateConfig {
    /// Inbound server settings.
    pub server: ServerConfig,
    /// Durable store settings.
    pub store: StoreConfig,
    /// Cache namespace settings.
    pub cache: CacheConfig,
    /// Session memory caps.
    pub memory: MemoryConfig,
    /// Retrieval defaults.
    pub retrieval: RetrievalConfig,
    /// LLM provider settings.
    pub llm: LlmConfig,
    /// Intent classifier settings.
    pub intent: IntentConfig,
    /// Tool plane settings.
    pub tools: ToolsConfig,
    /// Policy loader settings.
    pub policy: PolicySectionConfig,
    /// Feedback workflow settings.
    pub feedback: FeedbackConfig,
    /// Alert evaluation settings.
    pub alerts: AlertsConfig,
}

impl PersonaGateConfig {
    /// Loads configuration from a TOML file and applies env overrides.
    ///
    /// The path defaults to `persona-gate.toml`, overridable with the
    /// `PERSONA_GATE_CONFIG` environment variable. A missing file yields the
    /// default configuration (env overrides still apply).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when reading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = path.map_or_else(
            || env::var(CONFIG_PATH_ENV).map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from),
            Path::to_path_buf,
        );
        let mut config = if resolved.exists() {
            let metadata =
                fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
            if metadata.len() > MAX_CONFIG_BYTES {
                return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
            }
            let content =
                fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
            toml::from_str::<Self>(&content).map_err(|err| ConfigError::Parse(err.to_string()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides for secrets and deploy-time endpoints.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("DATABASE_PATH") {
            self.store.path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("QDRANT_URL") {
            self.retrieval.qdrant.url = value;
        }
        if let Ok(value) = env::var("LLM_PROVIDER") {
            match value.as_str() {
                "baidu" => self.llm.provider = LlmProviderKind::Baidu,
                "openai" => self.llm.provider = LlmProviderKind::Openai,
                "qwen" => self.llm.provider = LlmProviderKind::Qwen,
                "ollama" => self.llm.provider = LlmProviderKind::Ollama,
                "sandbox" => self.llm.provider = LlmProviderKind::Sandbox,
                _ => {}
            }
        }
        if let Ok(value) = env::var("OPENAI_API_KEY") {
            self.llm.openai.api_key = value;
        }
        if let Ok(value) = env::var("BAIDU_API_KEY") {
            self.llm.baidu.api_key = value;
        }
        if let Ok(value) = env::var("BAIDU_SECRET_KEY") {
            self.llm.baidu.secret_key = value;
        }
        if let Ok(value) = env::var("QWEN_API_KEY") {
            self.llm.qwen.api_key = value;
        }
        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            self.llm.ollama.base_url = value;
        }
        if let Ok(value) = env::var("INTERNAL_API_KEY") {
            self.server.internal_api_key = Some(value);
        }
        if let Ok(value) = env::var("ALERT_WEBHOOK_URL") {
            self.alerts.webhook_url = Some(value);
        }
        if let Ok(value) = env::var("RETRIEVAL_TRGM_WEIGHT")
            && let Ok(weight) = value.parse::<f64>()
        {
            self.retrieval.trgm_weight = weight;
        }
        if let Ok(value) = env::var("RETRIEVAL_QDRANT_WEIGHT")
            && let Ok(weight) = value.parse::<f64>()
        {
            self.retrieval.qdrant_weight = weight;
        }
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.memory.validate()?;
        self.retrieval.validate()?;
        self.llm.validate()?;
        self.tools.validate()?;
        self.feedback.validate()?;
        self.alerts.validate()?;
        Ok(())
    }
}
