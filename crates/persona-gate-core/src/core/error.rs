// persona-gate-core/src/core/error.rs
// ============================================================================
// Module: Persona Gate Error Taxonomy
// Description: Shared error classification for all subsystems.
// Purpose: Map classified errors to HTTP statuses and retry policy.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every subsystem classifies failures into this taxonomy before they cross a
//! component boundary. Retry loops consult [`ErrorKind::is_retryable`]; the
//! HTTP surface consults [`ErrorKind::http_status`]. The turn pipeline never
//! surfaces these to the caller; it degrades instead.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Classified error category shared across the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Authentication failed (missing or invalid credentials).
    Auth,
    /// Caller is authenticated but not allowed to perform the action.
    Permission,
    /// Referenced record does not exist.
    NotFound,
    /// Request payload failed validation.
    Validation,
    /// Operation exceeded its deadline.
    Timeout,
    /// Caller or dependency is rate limited.
    RateLimit,
    /// A downstream dependency failed.
    Dependency,
    /// Content was rejected by a safety filter.
    ContentFilter,
    /// Optimistic concurrency or uniqueness violation.
    Conflict,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status mapped to this category.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Auth => 401,
            Self::Permission => 403,
            Self::NotFound => 404,
            Self::Validation => 422,
            Self::Timeout => 504,
            Self::RateLimit => 429,
            Self::Dependency => 502,
            Self::ContentFilter => 451,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }

    /// Returns whether callers may retry operations failing in this category.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimit | Self::Dependency)
    }

    /// Returns the stable wire label for this category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Dependency => "dependency",
            Self::ContentFilter => "content_filter",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
