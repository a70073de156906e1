// persona-gate-tools/src/breaker.rs
// ============================================================================
// Module: Circuit Breaker
// Description: Per-key circuit breaker for tool calls.
// Purpose: Stop hammering a failing tool until it recovers.
// Dependencies: std
// ============================================================================

//! ## Overview
//! One breaker tracks each `(tool, tenant, site)` key. Consecutive failures
//! past the threshold open the circuit; after the cool-down a single
//! half-open probe is admitted. A success closes the breaker, a failure
//! re-opens it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: State
// ============================================================================

/// Observable state of one breaker key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// One probe call is admitted.
    HalfOpen,
}

/// Internal bookkeeping for one key.
struct BreakerEntry {
    /// Consecutive failures observed while closed.
    consecutive_failures: u32,
    /// Instant the circuit opened, when open.
    opened_at: Option<Instant>,
    /// Whether a half-open probe is in flight.
    probe_in_flight: bool,
}

impl BreakerEntry {
    /// Fresh closed entry.
    const fn new() -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

// ============================================================================
// SECTION: Breaker
// ============================================================================

/// Circuit breaker keyed by `(tool, tenant, site)`.
pub struct CircuitBreaker {
    /// Consecutive failures that open a circuit.
    threshold: u32,
    /// Cool-down before a half-open probe.
    cooldown: Duration,
    /// Entries keyed by breaker key.
    entries: Mutex<HashMap<String, BreakerEntry>>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given threshold and cool-down.
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the breaker key for a call.
    #[must_use]
    pub fn key(tool: &str, tenant_id: &str, site_id: &str) -> String {
        format!("{tool}:{tenant_id}:{site_id}")
    }

    /// Asks to admit a call; open circuits reject until cool-down.
    ///
    /// Returns the state the call is admitted under, or `None` when the call
    /// must be rejected without reaching the tool.
    #[must_use]
    pub fn admit(&self, key: &str) -> Option<BreakerState> {
        let Ok(mut entries) = self.entries.lock() else {
            return Some(BreakerState::Closed);
        };
        let entry = entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        match entry.opened_at {
            None => Some(BreakerState::Closed),
            Some(opened_at) => {
                if opened_at.elapsed() < self.cooldown {
                    return None;
                }
                if entry.probe_in_flight {
                    return None;
                }
                entry.probe_in_flight = true;
                Some(BreakerState::HalfOpen)
            }
        }
    }

    /// Records a successful call; closes the circuit.
    pub fn record_success(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock()
            && let Some(entry) = entries.get_mut(key)
        {
            entry.consecutive_failures = 0;
            entry.opened_at = None;
            entry.probe_in_flight = false;
        }
    }

    /// Records a failed call; opens the circuit past the threshold.
    pub fn record_failure(&self, key: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let entry = entries.entry(key.to_string()).or_insert_with(BreakerEntry::new);
        if entry.opened_at.is_some() {
            // A failed half-open probe restarts the cool-down.
            entry.opened_at = Some(Instant::now());
            entry.probe_in_flight = false;
            return;
        }
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        if entry.consecutive_failures >= self.threshold {
            entry.opened_at = Some(Instant::now());
            entry.probe_in_flight = false;
        }
    }

    /// Returns the observable state of a key.
    #[must_use]
    pub fn state(&self, key: &str) -> BreakerState {
        let Ok(entries) = self.entries.lock() else {
            return BreakerState::Closed;
        };
        entries.get(key).map_or(BreakerState::Closed, |entry| match entry.opened_at {
            None => BreakerState::Closed,
            Some(opened_at) if opened_at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        })
    }
}
