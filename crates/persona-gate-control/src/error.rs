// persona-gate-control/src/error.rs
// ============================================================================
// Module: Control Plane Errors
// Description: Shared error type for control-plane services.
// Purpose: Classify control-plane failures against the shared taxonomy.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! Control-plane operations fail with a structured error: validation errors
//! carry the full offence list so callers can report every bad field at
//! once; store failures keep their classification.

// ============================================================================
// SECTION: Imports
// ============================================================================

use persona_gate_core::ErrorKind;
use persona_gate_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Error
// ============================================================================

/// Control-plane service errors.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Payload failed validation; every offence is listed.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// Referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// State transition or uniqueness conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Durable store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl ControlError {
    /// Maps the failure into the shared taxonomy.
    #[must_use]
    pub const fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Store(err) => err.error_kind(),
        }
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}
