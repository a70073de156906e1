// persona-gate-core/src/core/experiment.rs
// ============================================================================
// Module: Persona Gate Experiment Model
// Description: A/B experiment definitions and deterministic bucketing.
// Purpose: Assign subjects to variants stably and idempotently.
// Dependencies: crc32fast, serde
// ============================================================================

//! ## Overview
//! Experiments split traffic across weighted variants. Bucketing is a pure
//! function of `(experiment_id, subject_key)` via CRC32, so any number of
//! concurrent calls resolve to the same variant; persisted assignments make
//! the result stable even if weights later change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ExperimentId;
use crate::core::identifiers::Scope;
use crate::core::release::RetrievalStrategy;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of buckets subjects are hashed into.
const BUCKET_COUNT: u32 = 100;

/// Sum variant weights must reach.
pub const TOTAL_WEIGHT: u32 = 100;

// ============================================================================
// SECTION: Status and Subjects
// ============================================================================

/// Experiment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Defined but not running.
    Draft,
    /// Running; eligible for release payloads.
    Active,
    /// Temporarily halted.
    Paused,
    /// Finished; terminal.
    Completed,
}

impl ExperimentStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key the experiment buckets subjects by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// Bucket by end-user identifier.
    UserId,
    /// Bucket by session identifier.
    #[default]
    SessionId,
}

impl SubjectType {
    /// Returns the stable wire label for this subject type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::SessionId => "session_id",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Variants
// ============================================================================

/// Strategy dials a variant overrides for its bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyOverrides {
    /// Overrides the retrieval strategy.
    #[serde(default)]
    pub strategy: Option<RetrievalStrategy>,
    /// Overrides the retrieval top-k.
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Overrides the retrieval minimum score.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Overrides the gate's minimum qualifying citation count.
    #[serde(default)]
    pub min_evidence_count: Option<u32>,
    /// Overrides the gate's minimum qualifying confidence.
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

/// Weighted experiment variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant name recorded on traces.
    pub name: String,
    /// Traffic weight; weights across variants sum to 100.
    pub weight: u32,
    /// Strategy dials this variant overrides.
    #[serde(default)]
    pub strategy_overrides: StrategyOverrides,
}

/// Experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Variants in declaration order; order breaks bucket ties.
    pub variants: Vec<Variant>,
    /// Key subjects are bucketed by.
    #[serde(default)]
    pub subject_type: SubjectType,
}

impl ExperimentConfig {
    /// Validates that variants are present and weights sum to 100.
    ///
    /// # Errors
    ///
    /// Returns a list of offending fields when invalid.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut offences = Vec::new();
        if self.variants.is_empty() {
            offences.push("variants: must not be empty".to_string());
        }
        let total: u32 = self.variants.iter().map(|variant| variant.weight).sum();
        if !self.variants.is_empty() && total != TOTAL_WEIGHT {
            offences.push(format!("variants: weights sum to {total}, expected {TOTAL_WEIGHT}"));
        }
        for variant in &self.variants {
            if variant.name.is_empty() {
                offences.push("variants: variant name must not be empty".to_string());
            }
        }
        if offences.is_empty() { Ok(()) } else { Err(offences) }
    }
}

// ============================================================================
// SECTION: Experiment
// ============================================================================

/// A/B experiment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment identifier.
    pub id: ExperimentId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Human-readable experiment name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ExperimentStatus,
    /// Variant configuration.
    pub config: ExperimentConfig,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// Persisted variant assignment for one subject.
///
/// # Invariants
/// - Unique on `(experiment_id, subject_key)`; the first writer wins and all
///   concurrent requests resolve to the same variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    /// Experiment the assignment belongs to.
    pub experiment_id: ExperimentId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Subject key kind.
    pub subject_type: SubjectType,
    /// Subject key value (session or user identifier).
    pub subject_key: String,
    /// Assigned variant name.
    pub variant: String,
    /// Bucket the subject hashed into, in `[0, 99]`.
    pub bucket_hash: u8,
    /// Snapshot of the variant's strategy overrides at assignment time.
    pub strategy_overrides: StrategyOverrides,
    /// Assignment timestamp.
    pub assigned_at: Timestamp,
}

// ============================================================================
// SECTION: Bucketing
// ============================================================================

/// Computes the deterministic bucket for a subject.
///
/// The bucket is `CRC32(experiment_id ':' subject_key) mod 100`, so the same
/// inputs always land in the same bucket.
#[must_use]
pub fn bucket_hash(experiment_id: &ExperimentId, subject_key: &str) -> u8 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(experiment_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(subject_key.as_bytes());
    let bucket = hasher.finalize() % BUCKET_COUNT;
    // BUCKET_COUNT is 100, so the modulus always fits in a u8.
    u8::try_from(bucket).unwrap_or(0)
}

/// Walks variants by cumulative weight and returns the winner for a bucket.
///
/// The first variant whose cumulative weight exceeds the bucket wins; ties
/// are broken by declaration order.
#[must_use]
pub fn variant_for_bucket(variants: &[Variant], bucket: u8) -> Option<&Variant> {
    let mut cumulative = 0_u32;
    for variant in variants {
        cumulative = cumulative.saturating_add(variant.weight);
        if u32::from(bucket) < cumulative {
            return Some(variant);
        }
    }
    variants.last()
}
