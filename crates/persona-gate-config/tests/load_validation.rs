// persona-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load and Validation Tests
// Description: TOML loading, defaults, and fail-closed validation coverage.
// ============================================================================
//! ## Overview
//! Validates that defaults validate, malformed dials are rejected with the
//! offending field named, and TOML files round-trip into the typed model.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::io::Write;

use persona_gate_config::LlmProviderKind;
use persona_gate_config::PersonaGateConfig;
use persona_gate_core::RetrievalStrategy;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// The default configuration validates.
#[test]
fn defaults_validate() {
    let config = PersonaGateConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.llm.provider, LlmProviderKind::Sandbox);
    assert_eq!(config.retrieval.strategy, RetrievalStrategy::Hybrid);
    assert_eq!(config.memory.max_messages, 10);
    assert_eq!(config.memory.max_chars, 4_000);
}

/// Per-tool policies fall back to the default policy.
#[test]
fn tool_policy_falls_back_to_default() {
    let config = PersonaGateConfig::default();
    let policy = config.tools.policy_for("retrieve_evidence");
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.circuit_breaker_threshold, 5);
}

// ============================================================================
// SECTION: Validation Failures
// ============================================================================

/// Out-of-range retrieval dials are rejected with the field named.
#[test]
fn bad_retrieval_dials_rejected() {
    let mut config = PersonaGateConfig::default();
    config.retrieval.min_score = 1.5;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("retrieval.min_score"));

    let mut config = PersonaGateConfig::default();
    config.retrieval.top_k = 0;
    assert!(config.validate().is_err());
}

/// Provider selection requires the matching credentials.
#[test]
fn provider_requires_credentials() {
    let mut config = PersonaGateConfig::default();
    config.llm.provider = LlmProviderKind::Openai;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("llm.openai.api_key"));

    config.llm.openai.api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());
}

/// Tool attempt budgets are bounded.
#[test]
fn tool_attempts_bounded() {
    let mut config = PersonaGateConfig::default();
    config.tools.default_policy.max_attempts = 7;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("max_attempts"));
}

/// A weak internal key is rejected.
#[test]
fn weak_internal_key_rejected() {
    let mut config = PersonaGateConfig::default();
    config.server.internal_api_key = Some("short".to_string());
    assert!(config.validate().is_err());
}

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// A TOML file loads into the typed model.
#[test]
fn toml_file_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
bind_addr = "127.0.0.1:9001"

[retrieval]
top_k = 3
min_score = 0.5

[llm]
provider = "sandbox"
temperature = 0.2
"#
    )
    .unwrap();
    let config = PersonaGateConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.bind_addr, "127.0.0.1:9001");
    assert_eq!(config.retrieval.top_k, 3);
    assert!((config.llm.temperature - 0.2).abs() < f64::EPSILON);
}

/// Unknown fields are rejected rather than silently ignored.
#[test]
fn unknown_fields_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
bind_addr = "127.0.0.1:9001"
surprise = true
"#
    )
    .unwrap();
    assert!(PersonaGateConfig::load(Some(file.path())).is_err());
}
