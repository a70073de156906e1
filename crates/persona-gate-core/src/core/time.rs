// persona-gate-core/src/core/time.rs
// ============================================================================
// Module: Persona Gate Time Model
// Description: Canonical timestamp representation for traces and schedules.
// Purpose: Provide deterministic, replayable time values across Persona Gate records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Persona Gate uses explicit unix-millisecond timestamps embedded in traces,
//! schedules, and SLA deadlines to keep replay deterministic. The core engine
//! never reads wall-clock time directly; hosts must supply timestamps at the
//! request boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per hour, used for SLA deadline arithmetic.
const MILLIS_PER_HOUR: i64 = 3_600_000;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Persona Gate records (unix milliseconds).
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads the
///   wall clock.
/// - Monotonicity within a record (`completed_at >= started_at`) is enforced
///   at the record level, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the non-negative number of milliseconds elapsed since
    /// `earlier`, clamping clock skew to zero.
    #[must_use]
    pub const fn saturating_millis_since(self, earlier: Self) -> u64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta as u64 }
    }

    /// Returns a timestamp shifted forward by the given milliseconds.
    #[must_use]
    pub const fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns a timestamp shifted forward by the given number of hours.
    #[must_use]
    pub const fn plus_hours(self, hours: i64) -> Self {
        Self(self.0.saturating_add(hours.saturating_mul(MILLIS_PER_HOUR)))
    }

    /// Returns whether this timestamp is strictly before `other`.
    #[must_use]
    pub const fn is_before(self, other: Self) -> bool {
        self.0 < other.0
    }
}
