// persona-gate-providers/src/lib.rs
// ============================================================================
// Module: Persona Gate Providers Library
// Description: LLM, embedding, retrieval, and intent classification backends.
// Purpose: Implement the core capability interfaces against real services.
// Dependencies: crate::{embedding, intent, llm, retrieval}
// ============================================================================

//! ## Overview
//! Providers implement the capability interfaces of `persona-gate-core`
//! against concrete backends: OpenAI-compatible and ERNIE chat endpoints,
//! a local Ollama daemon, the qdrant REST search API, in-process trigram
//! scoring, and rule or LLM intent classification. Every failure is
//! classified before it crosses the interface so callers can apply the
//! shared retry policy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod embedding;
pub mod intent;
pub mod llm;
pub mod retrieval;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use embedding::AuditedEmbeddingProvider;
pub use embedding::OpenAiEmbeddingProvider;
pub use intent::LlmIntentClassifier;
pub use intent::RuleIntentClassifier;
pub use llm::BaiduErnieProvider;
pub use llm::OllamaProvider;
pub use llm::OpenAiChatProvider;
pub use llm::ProviderBuildError;
pub use llm::SandboxProvider;
pub use llm::build_llm_provider;
pub use llm::generate_with_retry;
pub use retrieval::HybridRetriever;
pub use retrieval::QdrantRetriever;
pub use retrieval::TrgmRetriever;
pub use retrieval::build_retrieval_provider;
pub use retrieval::trigram_similarity;
