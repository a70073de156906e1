// persona-gate-core/src/core/intent.rs
// ============================================================================
// Module: Persona Gate Intent Model
// Description: Query intent labels and classification results.
// Purpose: Name the intents the evidence gate keys its rules on.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every user turn is classified into one of a small set of intents before
//! the evidence gate runs. Fact-seeking turns demand evidence; sensitive
//! turns are refused outright; greetings short-circuit the pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Intent
// ============================================================================

/// Query intent label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Factual question requiring evidence support.
    FactSeeking,
    /// Preference or context question answerable from session memory.
    ContextPreference,
    /// Sensitive topic that must be refused.
    Sensitive,
    /// Salutation answered from greeting templates.
    Greeting,
    /// Unclassifiable query.
    Unknown,
}

impl Intent {
    /// Returns the stable wire label for this intent.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FactSeeking => "fact_seeking",
            Self::ContextPreference => "context_preference",
            Self::Sensitive => "sensitive",
            Self::Greeting => "greeting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Classification Result
// ============================================================================

/// Outcome of intent classification for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    /// Classified intent label.
    pub intent: Intent,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Short machine-readable reason label.
    pub reason: String,
    /// Keywords that triggered the classification.
    pub matched_terms: Vec<String>,
    /// Whether the query touches history and so may require verified evidence.
    pub history_related: bool,
}

impl IntentResult {
    /// Builds a result for an unclassifiable query.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            reason: "no_rule_matched".to_string(),
            matched_terms: Vec::new(),
            history_related: false,
        }
    }
}
