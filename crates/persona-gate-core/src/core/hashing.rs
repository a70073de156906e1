// persona-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Persona Gate Hashing
// Description: Canonical JSON hashing and fingerprint helpers.
// Purpose: Provide stable digests for dedup keys, payload audit, and cache keys.
// Dependencies: serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Hashing in Persona Gate always goes through canonical JSON (RFC 8785) so
//! that digests are stable across serialization order. Digests drive alert
//! dedup keys, tool payload audit hashes, and intent/evidence cache
//! fingerprints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hex length of a truncated fingerprint used in cache keys.
const FINGERPRINT_HEX_LENGTH: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while hashing values.
#[derive(Debug, Error)]
pub enum HashingError {
    /// Value could not be canonicalized to JSON.
    #[error("canonical json serialization failed: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Digest Helpers
// ============================================================================

/// Returns the lowercase hex SHA-256 digest of the given bytes.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Hashes a serializable value through canonical JSON.
///
/// # Errors
///
/// Returns [`HashingError`] when the value cannot be canonicalized.
pub fn hash_canonical_json<T: Serialize>(value: &T) -> Result<String, HashingError> {
    let canonical =
        serde_jcs::to_string(value).map_err(|err| HashingError::Canonicalization(err.to_string()))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Builds a short fingerprint over colon-joined parts.
///
/// Used for cache keys where a full digest would be needlessly long; the
/// truncation length matches the evidence cache key convention.
#[must_use]
pub fn short_fingerprint(parts: &[&str]) -> String {
    let joined = parts.join(":");
    let mut digest = sha256_hex(joined.as_bytes());
    digest.truncate(FINGERPRINT_HEX_LENGTH);
    digest
}
