// persona-gate-core/src/core/alerts.rs
// ============================================================================
// Module: Persona Gate Alert Model
// Description: Declarative alert rules, events, and silences.
// Purpose: Coalesce repeat firings and suppress notifications under silences.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Alert rules compare a metric value against a threshold per `(tenant,
//! site)`. Firings are coalesced by a dedup key so repeat evaluations update
//! one row instead of inserting two; silences suppress webhook notifications
//! without hiding the event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::sha256_hex;
use crate::core::identifiers::SiteId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Severity and Condition
// ============================================================================

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational.
    Low,
    /// Worth a look.
    Medium,
    /// Page-worthy.
    High,
    /// All hands.
    Critical,
}

impl AlertSeverity {
    /// Returns the stable wire label for this severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Returns whether newly firing events at this severity notify webhooks.
    #[must_use]
    pub const fn notifies(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator an alert rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertCondition {
    /// Fire when the value is strictly greater than the threshold.
    #[serde(rename = ">")]
    GreaterThan,
    /// Fire when the value is strictly less than the threshold.
    #[serde(rename = "<")]
    LessThan,
    /// Fire when the value is greater than or equal to the threshold.
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// Fire when the value is less than or equal to the threshold.
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl AlertCondition {
    /// Evaluates the condition against a value and threshold.
    #[must_use]
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessOrEqual => value <= threshold,
        }
    }

    /// Returns the stable wire label for this condition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// One declarative alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Stable alert code (for example `high_fallback_rate`).
    pub code: String,
    /// Severity assigned to firings.
    pub severity: AlertSeverity,
    /// Evaluation window label (for example `15m`).
    pub window: String,
    /// Metric expression evaluated by the metric source.
    pub expr: String,
    /// Threshold compared against.
    pub threshold: f64,
    /// Comparison operator.
    pub condition: AlertCondition,
    /// Unit label for display.
    #[serde(default)]
    pub unit: Option<String>,
}

/// Declarative rule set loaded from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleSet {
    /// Rules evaluated each cycle.
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Firing state of an alert event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Condition currently holds.
    Firing,
    /// Condition stopped holding.
    Resolved,
}

impl AlertStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Firing => "firing",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted alert event.
///
/// # Invariants
/// - At most one firing row per `dedup_key`; repeat firings update
///   `last_seen_at` and `current_value` on the existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Event row identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Site the firing concerns, when scoped to one.
    pub site_id: Option<SiteId>,
    /// Alert code from the rule.
    pub alert_code: String,
    /// Severity from the rule.
    pub severity: AlertSeverity,
    /// Firing state.
    pub status: AlertStatus,
    /// Evaluation window label.
    pub window: String,
    /// Metric value at the last evaluation.
    pub current_value: f64,
    /// Threshold from the rule.
    pub threshold: f64,
    /// Comparison operator from the rule.
    pub condition: AlertCondition,
    /// Unit label for display.
    pub unit: Option<String>,
    /// Dedup key coalescing repeat firings.
    pub dedup_key: String,
    /// First time the condition held.
    pub first_seen_at: Timestamp,
    /// Most recent time the condition held.
    pub last_seen_at: Timestamp,
    /// When the event resolved, if it has.
    pub resolved_at: Option<Timestamp>,
    /// Evaluation context (release, experiment, sample counts).
    pub context: Value,
    /// Whether a webhook notification was sent.
    pub webhook_sent: bool,
    /// When the webhook notification was sent.
    pub webhook_sent_at: Option<Timestamp>,
}

/// Computes the dedup key coalescing firings of one rule in one scope.
#[must_use]
pub fn alert_dedup_key(tenant_id: &TenantId, site_id: Option<&SiteId>, code: &str) -> String {
    let site = site_id.map_or("", SiteId::as_str);
    let joined = format!("{}:{site}:{code}", tenant_id.as_str());
    sha256_hex(joined.as_bytes())
}

// ============================================================================
// SECTION: Silences
// ============================================================================

/// Silence rule suppressing webhook notifications for matching events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSilence {
    /// Silence row identifier.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Restricts the silence to one site, when set.
    pub site_id: Option<SiteId>,
    /// Restricts the silence to one alert code, when set.
    pub alert_code: Option<String>,
    /// Restricts the silence to one severity, when set.
    pub severity: Option<AlertSeverity>,
    /// Silence window start.
    pub starts_at: Timestamp,
    /// Silence window end.
    pub ends_at: Timestamp,
    /// Operator-supplied reason.
    pub reason: Option<String>,
    /// Operator who created the silence.
    pub created_by: String,
}

impl AlertSilence {
    /// Returns whether this silence suppresses the given event at `now`.
    #[must_use]
    pub fn matches(&self, event: &AlertEvent, now: Timestamp) -> bool {
        if now.is_before(self.starts_at) || self.ends_at.is_before(now) {
            return false;
        }
        if self.tenant_id != event.tenant_id {
            return false;
        }
        if self.site_id.as_ref().is_some_and(|site| Some(site) != event.site_id.as_ref()) {
            return false;
        }
        if self.alert_code.as_deref().is_some_and(|code| code != event.alert_code) {
            return false;
        }
        if self.severity.is_some_and(|severity| severity != event.severity) {
            return false;
        }
        true
    }
}
