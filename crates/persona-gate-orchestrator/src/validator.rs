// persona-gate-orchestrator/src/validator.rs
// ============================================================================
// Module: Output Validator
// Description: Post-generation scan for policy violations.
// Purpose: Replace non-compliant answers with templates, never fail the turn.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! The validator scans the generated answer (and the query) for sensitive
//! keywords, the NPC's forbidden topics, and, for historically framed
//! personas, anachronisms. A violation is not an error: the answer is
//! replaced with the refuse template and the trace records that the
//! guardrail intervened. Template selection is first-index for
//! reproducibility; a persona's own fallbacks win over the generic ones.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_core::NpcProfile;
use persona_gate_core::PolicyMode;
use persona_gate_core::TimeAwareness;

// ============================================================================
// SECTION: Templates and Lexicons
// ============================================================================

/// Generic conservative templates; index zero is canonical.
const CONSERVATIVE_TEMPLATES: &[&str] = &[
    "I am not certain about that; you may want to ask the village elders.",
    "I know little of that matter; the written records may serve you better.",
];

/// Generic refuse templates; index zero is canonical.
const REFUSE_TEMPLATES: &[&str] = &[
    "I would rather not speak of that topic. Shall we talk of something else?",
    "That matter is not mine to discuss.",
];

/// Sentence returned when the model is unavailable after retries.
const APOLOGY_TEMPLATE: &str =
    "Forgive me, I cannot gather my thoughts just now. Please ask me again shortly.";

/// Sensitive keywords scanned in queries and answers.
const SENSITIVE_KEYWORDS: &[&str] = &[
    "politics",
    "political",
    "gambling",
    "violence",
    "drugs",
    "pornography",
    "superstition",
];

/// Anachronism keywords filtered for historically framed personas.
const ANACHRONISM_KEYWORDS: &[&str] = &[
    "internet",
    "smartphone",
    "television",
    "computer",
    "airplane",
    "automobile",
    "electricity",
    "wifi",
];

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of validating one generated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// Whether the answer passed unchanged.
    pub passed: bool,
    /// Mode after validation; a violation downgrades to refuse.
    pub mode: PolicyMode,
    /// Machine-readable reason when the guardrail intervened.
    pub reason: Option<String>,
    /// Replacement text when the guardrail intervened.
    pub replacement: Option<String>,
}

impl ValidationOutcome {
    /// Outcome for an answer that passed unchanged.
    const fn pass(mode: PolicyMode) -> Self {
        Self {
            passed: true,
            mode,
            reason: None,
            replacement: None,
        }
    }
}

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Post-generation output validator.
#[derive(Default)]
pub struct OutputValidator;

impl OutputValidator {
    /// Creates the validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a generated answer against the persona's constraints.
    #[must_use]
    pub fn validate(
        &self,
        answer: &str,
        query: &str,
        profile: &NpcProfile,
        mode: PolicyMode,
    ) -> ValidationOutcome {
        let answer_lowered = answer.to_lowercase();
        let query_lowered = query.to_lowercase();

        if let Some(keyword) = SENSITIVE_KEYWORDS
            .iter()
            .find(|keyword| answer_lowered.contains(**keyword) || query_lowered.contains(**keyword))
        {
            return ValidationOutcome {
                passed: false,
                mode: PolicyMode::Refuse,
                reason: Some(format!("sensitive_keyword:{keyword}")),
                replacement: Some(Self::refuse_template().to_string()),
            };
        }

        if let Some(topic) = profile.forbidden_topics.iter().find(|topic| {
            let lowered = topic.to_lowercase();
            answer_lowered.contains(&lowered) || query_lowered.contains(&lowered)
        }) {
            return ValidationOutcome {
                passed: false,
                mode: PolicyMode::Refuse,
                reason: Some(format!("forbidden_topic:{topic}")),
                replacement: Some(Self::refuse_template().to_string()),
            };
        }

        if profile.time_awareness == TimeAwareness::Historical
            && let Some(keyword) =
                ANACHRONISM_KEYWORDS.iter().find(|keyword| answer_lowered.contains(**keyword))
        {
            return ValidationOutcome {
                passed: false,
                mode: PolicyMode::Refuse,
                reason: Some(format!("anachronism:{keyword}")),
                replacement: Some(Self::refuse_template().to_string()),
            };
        }

        ValidationOutcome::pass(mode)
    }

    /// Returns the conservative answer for a persona (first-index selection).
    #[must_use]
    pub fn conservative_template(profile: &NpcProfile) -> &str {
        profile.fallback_response().unwrap_or(CONSERVATIVE_TEMPLATES[0])
    }

    /// Returns the canonical refuse template.
    #[must_use]
    pub const fn refuse_template() -> &'static str {
        REFUSE_TEMPLATES[0]
    }

    /// Returns the canned apology used when the model is unavailable.
    #[must_use]
    pub const fn apology_template() -> &'static str {
        APOLOGY_TEMPLATE
    }
}
