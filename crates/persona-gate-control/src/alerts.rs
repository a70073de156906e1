// persona-gate-control/src/alerts.rs
// ============================================================================
// Module: Alert Evaluator
// Description: Scheduled rule evaluation with dedup, silences, and webhooks.
// Purpose: Surface system health regressions exactly once per firing.
// Dependencies: persona-gate-core, reqwest, serde_yaml
// ============================================================================

//! ## Overview
//! Each cycle evaluates every rule for a `(tenant, site)` against the metric
//! source. Firings coalesce on a dedup key: repeats update the existing row,
//! new firings insert one and notify the webhook at high or critical
//! severity unless a silence matches. Rules that stop firing resolve their
//! row. The evaluator is single-instance per scope; the caller holds the
//! scheduling lease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use persona_gate_core::AlertEvent;
use persona_gate_core::AlertRule;
use persona_gate_core::AlertRuleSet;
use persona_gate_core::AlertSilence;
use persona_gate_core::AlertStatus;
use persona_gate_core::AlertStore;
use persona_gate_core::MetricSource;
use persona_gate_core::NotifyError;
use persona_gate_core::SiteId;
use persona_gate_core::StoreError;
use persona_gate_core::TenantId;
use persona_gate_core::Timestamp;
use persona_gate_core::WebhookNotifier;
use persona_gate_core::alert_dedup_key;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ControlError;

// ============================================================================
// SECTION: Rule Loading
// ============================================================================

/// Errors raised while loading the rule set.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    /// Rule file could not be read.
    #[error("alert rules io error: {0}")]
    Io(String),
    /// Rule file could not be parsed.
    #[error("alert rules parse error: {0}")]
    Parse(String),
}

/// Loads the YAML rule set from disk.
///
/// # Errors
///
/// Returns [`RuleLoadError`] when reading or parsing fails.
pub fn load_rule_set(path: &Path) -> Result<AlertRuleSet, RuleLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|err| RuleLoadError::Io(err.to_string()))?;
    serde_yaml::from_str(&raw).map_err(|err| RuleLoadError::Parse(err.to_string()))
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Outcome of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// Rules evaluated.
    pub total_rules: u64,
    /// Rules currently firing.
    pub firing: u64,
    /// New firing rows inserted this cycle.
    pub new_alerts: u64,
    /// Existing firing rows touched this cycle.
    pub updated_alerts: u64,
    /// Firing rows resolved this cycle.
    pub resolved_alerts: u64,
    /// Firings suppressed by silences.
    pub silenced_alerts: u64,
    /// Webhook notifications delivered.
    pub webhooks_sent: u64,
    /// Rules skipped because the metric source failed.
    pub metric_errors: u64,
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Scheduled alert rule evaluator.
pub struct AlertEvaluator {
    /// Declarative rule set.
    rules: AlertRuleSet,
    /// Alert event and silence store.
    store: Arc<dyn AlertStore>,
    /// Metric value source.
    metrics: Arc<dyn MetricSource>,
    /// Webhook fan-out; `None` disables notification.
    notifier: Option<Arc<dyn WebhookNotifier>>,
}

impl AlertEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        rules: AlertRuleSet,
        store: Arc<dyn AlertStore>,
        metrics: Arc<dyn MetricSource>,
        notifier: Option<Arc<dyn WebhookNotifier>>,
    ) -> Self {
        Self {
            rules,
            store,
            metrics,
            notifier,
        }
    }

    /// Evaluates every rule for one scope.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the store fails; metric source
    /// failures only skip the affected rule.
    pub async fn evaluate(
        &self,
        tenant_id: &TenantId,
        site_id: Option<&SiteId>,
        now: Timestamp,
    ) -> Result<EvaluationSummary, ControlError> {
        let mut summary = EvaluationSummary::default();
        let silences = self.store.active_silences(tenant_id, now)?;

        for rule in &self.rules.rules {
            summary.total_rules += 1;
            let value = match self.metrics.current_value(
                tenant_id,
                site_id.map(SiteId::as_str),
                &rule.expr,
                &rule.window,
            ) {
                Ok(value) => value,
                Err(_) => {
                    summary.metric_errors += 1;
                    continue;
                }
            };
            let dedup_key = alert_dedup_key(tenant_id, site_id, &rule.code);

            if rule.condition.holds(value, rule.threshold) {
                summary.firing += 1;
                self.handle_firing(
                    rule,
                    tenant_id,
                    site_id,
                    &dedup_key,
                    value,
                    &silences,
                    now,
                    &mut summary,
                )
                .await?;
            } else if self.store.resolve_event(&dedup_key, now)? {
                summary.resolved_alerts += 1;
            }
        }
        Ok(summary)
    }

    /// Coalesces one firing and notifies when appropriate.
    #[allow(clippy::too_many_arguments, reason = "Evaluation state is threaded explicitly.")]
    async fn handle_firing(
        &self,
        rule: &AlertRule,
        tenant_id: &TenantId,
        site_id: Option<&SiteId>,
        dedup_key: &str,
        value: f64,
        silences: &[AlertSilence],
        now: Timestamp,
        summary: &mut EvaluationSummary,
    ) -> Result<(), ControlError> {
        if self.store.firing_event(dedup_key)?.is_some() {
            self.store.touch_event(dedup_key, value, now)?;
            summary.updated_alerts += 1;
            return Ok(());
        }

        let event = AlertEvent {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.clone(),
            site_id: site_id.cloned(),
            alert_code: rule.code.clone(),
            severity: rule.severity,
            status: AlertStatus::Firing,
            window: rule.window.clone(),
            current_value: value,
            threshold: rule.threshold,
            condition: rule.condition,
            unit: rule.unit.clone(),
            dedup_key: dedup_key.to_string(),
            first_seen_at: now,
            last_seen_at: now,
            resolved_at: None,
            context: json!({"expr": rule.expr}),
            webhook_sent: false,
            webhook_sent_at: None,
        };
        match self.store.insert_event(&event) {
            Ok(()) => {}
            // A concurrent evaluator inserted first; fold into its row.
            Err(StoreError::Conflict(_)) => {
                self.store.touch_event(dedup_key, value, now)?;
                summary.updated_alerts += 1;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        summary.new_alerts += 1;

        let silenced = silences.iter().any(|silence| silence.matches(&event, now));
        if silenced {
            summary.silenced_alerts += 1;
            return Ok(());
        }
        if rule.severity.notifies()
            && let Some(notifier) = &self.notifier
            && notifier.notify(&event).await.is_ok()
        {
            self.store.mark_webhook_sent(&event.id, now)?;
            summary.webhooks_sent += 1;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Webhook Notifier
// ============================================================================

/// Webhook notifier posting alert events as JSON.
pub struct HttpWebhookNotifier {
    /// Destination URL.
    url: String,
    /// HTTP client.
    client: reqwest::Client,
}

impl HttpWebhookNotifier {
    /// Creates a notifier for a destination URL.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the HTTP client cannot be built.
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        Ok(Self {
            url,
            client,
        })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|err| NotifyError::Delivery(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Delivery(format!(
                "webhook responded with status {}",
                response.status().as_u16()
            )))
        }
    }
}
