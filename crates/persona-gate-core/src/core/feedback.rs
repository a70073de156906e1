// persona-gate-core/src/core/feedback.rs
// ============================================================================
// Module: Persona Gate Feedback Model
// Description: Correction tickets with a monotonic workflow and SLA tracking.
// Purpose: Bind user corrections back to content and evidence revisions.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Feedback tickets move `pending -> reviewing -> accepted | rejected ->
//! resolved -> archived`. Backward transitions are forbidden and lifecycle
//! timestamps are monotonic. Routing rules assign an owner group and an SLA
//! deadline at submission; an overdue scan flags tickets past their deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::EvidenceId;
use crate::core::identifiers::FeedbackId;
use crate::core::identifiers::NpcId;
use crate::core::identifiers::Scope;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Kind of feedback submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    /// Correction of an answer.
    Correction,
    /// Reported factual error.
    FactError,
    /// Missing information.
    MissingInfo,
    /// Numeric rating.
    Rating,
    /// Improvement suggestion.
    Suggestion,
    /// Complaint.
    Complaint,
    /// Praise.
    Praise,
}

impl FeedbackType {
    /// Returns the stable wire label for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correction => "correction",
            Self::FactError => "fact_error",
            Self::MissingInfo => "missing_info",
            Self::Rating => "rating",
            Self::Suggestion => "suggestion",
            Self::Complaint => "complaint",
            Self::Praise => "praise",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of the reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSeverity {
    /// Minor issue.
    Low,
    /// Needs correction.
    Medium,
    /// Serious error.
    High,
    /// Must be handled immediately.
    Critical,
}

impl FeedbackSeverity {
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
}

impl fmt::Display for FeedbackSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    /// Submitted, awaiting triage.
    Pending,
    /// Under review.
    Reviewing,
    /// Accepted for resolution.
    Accepted,
    /// Rejected; still requires closure.
    Rejected,
    /// Resolved with a bound revision.
    Resolved,
    /// Archived; terminal.
    Archived,
}

impl FeedbackStatus {
    /// Returns the stable wire label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewing => "reviewing",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
        }
    }

    /// Returns whether a transition to `next` is allowed.
    ///
    /// Backward transitions are forbidden; the workflow is strictly forward.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Reviewing)
                | (Self::Reviewing, Self::Accepted)
                | (Self::Reviewing, Self::Rejected)
                | (Self::Accepted, Self::Resolved)
                | (Self::Rejected, Self::Resolved)
                | (Self::Resolved, Self::Archived)
        )
    }

    /// Returns whether the ticket is closed for SLA purposes.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Resolved | Self::Archived)
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Transition Errors
// ============================================================================

/// Errors raised by feedback workflow transitions.
#[derive(Debug, Error)]
pub enum FeedbackTransitionError {
    /// The requested transition is not allowed from the current status.
    #[error("transition from {from} to {to} is not allowed")]
    Forbidden {
        /// Current status.
        from: FeedbackStatus,
        /// Requested status.
        to: FeedbackStatus,
    },
    /// Resolution requires binding a content or evidence revision.
    #[error("resolution requires a content or evidence binding")]
    MissingResolutionBinding,
}

// ============================================================================
// SECTION: Feedback
// ============================================================================

/// Correction ticket.
///
/// # Invariants
/// - Lifecycle timestamps are monotonic: `triaged_at <= in_progress_at <=
///   closed_at` where present.
/// - Resolution binds at least one of `resolved_by_content_id` /
///   `resolved_by_evidence_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Ticket identifier.
    pub id: FeedbackId,
    /// Owning tenant and site.
    pub scope: Scope,
    /// Trace the ticket refers to, if any.
    pub trace_id: Option<TraceId>,
    /// NPC the ticket concerns, if any.
    pub npc_id: Option<NpcId>,
    /// Kind of feedback.
    pub feedback_type: FeedbackType,
    /// Severity of the issue.
    pub severity: FeedbackSeverity,
    /// Ticket body.
    pub content: String,
    /// Workflow status.
    pub status: FeedbackStatus,
    /// Assigned operator, if any.
    pub assignee: Option<String>,
    /// Owning group.
    pub group: Option<String>,
    /// Routing rule that assigned the ticket.
    pub matched_rule_id: Option<String>,
    /// SLA deadline.
    pub sla_due_at: Option<Timestamp>,
    /// Whether the overdue scan flagged the ticket.
    pub overdue_flag: bool,
    /// When the ticket entered review.
    pub triaged_at: Option<Timestamp>,
    /// When work on the ticket started (accept or reject).
    pub in_progress_at: Option<Timestamp>,
    /// When the ticket was resolved or archived.
    pub closed_at: Option<Timestamp>,
    /// Content revision that resolved the ticket.
    pub resolved_by_content_id: Option<String>,
    /// Evidence revision that resolved the ticket.
    pub resolved_by_evidence_id: Option<EvidenceId>,
    /// Operator who resolved the ticket.
    pub resolved_by: Option<String>,
    /// Resolution notes.
    pub resolution_notes: Option<String>,
    /// Submission timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl Feedback {
    /// Moves the ticket into review.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackTransitionError`] when the transition is forbidden.
    pub fn triage(&mut self, now: Timestamp) -> Result<(), FeedbackTransitionError> {
        self.transition(FeedbackStatus::Reviewing, now)?;
        self.triaged_at = Some(now);
        Ok(())
    }

    /// Accepts or rejects the ticket out of review.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackTransitionError`] when the transition is forbidden.
    pub fn decide(
        &mut self,
        accepted: bool,
        now: Timestamp,
    ) -> Result<(), FeedbackTransitionError> {
        let next = if accepted { FeedbackStatus::Accepted } else { FeedbackStatus::Rejected };
        self.transition(next, now)?;
        self.in_progress_at = Some(now);
        Ok(())
    }

    /// Resolves the ticket, binding the revision that fixed it.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackTransitionError`] when the transition is forbidden or
    /// no binding is supplied.
    pub fn resolve(
        &mut self,
        resolver: impl Into<String>,
        content_id: Option<String>,
        evidence_id: Option<EvidenceId>,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<(), FeedbackTransitionError> {
        if content_id.is_none() && evidence_id.is_none() {
            return Err(FeedbackTransitionError::MissingResolutionBinding);
        }
        self.transition(FeedbackStatus::Resolved, now)?;
        self.resolved_by = Some(resolver.into());
        self.resolved_by_content_id = content_id;
        self.resolved_by_evidence_id = evidence_id;
        self.resolution_notes = notes;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Archives the resolved ticket.
    ///
    /// # Errors
    ///
    /// Returns [`FeedbackTransitionError`] when the transition is forbidden.
    pub fn archive(&mut self, now: Timestamp) -> Result<(), FeedbackTransitionError> {
        self.transition(FeedbackStatus::Archived, now)?;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Applies a validated status transition and bumps `updated_at`.
    fn transition(
        &mut self,
        next: FeedbackStatus,
        now: Timestamp,
    ) -> Result<(), FeedbackTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(FeedbackTransitionError::Forbidden {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Returns whether the ticket is overdue at `now` and not yet flagged.
    #[must_use]
    pub fn newly_overdue(&self, now: Timestamp) -> bool {
        !self.overdue_flag
            && !self.status.is_closed()
            && self.sla_due_at.is_some_and(|due| due.is_before(now))
    }
}

// ============================================================================
// SECTION: Routing Rules
// ============================================================================

/// Conditions a routing rule matches on; empty conditions match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConditions {
    /// Matches tickets of this severity.
    #[serde(default)]
    pub severity: Option<FeedbackSeverity>,
    /// Matches tickets of this type.
    #[serde(default)]
    pub feedback_type: Option<FeedbackType>,
    /// Matches tickets from this site.
    #[serde(default)]
    pub site_id: Option<String>,
    /// Matches tickets about this NPC.
    #[serde(default)]
    pub npc_id: Option<String>,
}

impl RoutingConditions {
    /// Returns whether these conditions match a ticket's attributes.
    #[must_use]
    pub fn matches(
        &self,
        severity: FeedbackSeverity,
        feedback_type: FeedbackType,
        site_id: &str,
        npc_id: Option<&str>,
    ) -> bool {
        if self.severity.is_some_and(|expected| expected != severity) {
            return false;
        }
        if self.feedback_type.is_some_and(|expected| expected != feedback_type) {
            return false;
        }
        if self.site_id.as_deref().is_some_and(|expected| expected != site_id) {
            return false;
        }
        if self.npc_id.as_deref().is_some_and(|expected| Some(expected) != npc_id) {
            return false;
        }
        true
    }
}

/// Action a routing rule applies on match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAction {
    /// Operator to assign, if any.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Owning group.
    pub group: String,
    /// SLA window in hours.
    pub sla_hours: i64,
}

/// One routing rule; higher priority scans first, first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Stable rule identifier.
    pub id: String,
    /// Scan priority; higher scans first.
    pub priority: i64,
    /// Match conditions.
    #[serde(default)]
    pub conditions: RoutingConditions,
    /// Action applied on match.
    pub action: RoutingAction,
}

/// Routing policy file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    /// Group applied when no rule matches.
    pub default_group: String,
    /// SLA hours applied when no rule matches.
    pub default_sla_hours: i64,
    /// Rules scanned high-priority-first.
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

/// Routing outcome for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingOutcome {
    /// Operator assigned, if any.
    pub assignee: Option<String>,
    /// Owning group.
    pub group: String,
    /// SLA window in hours.
    pub sla_hours: i64,
    /// Rule that matched, or `default`.
    pub matched_rule_id: String,
}

impl RoutingPolicy {
    /// Scans rules high-priority-first and returns the first match.
    #[must_use]
    pub fn route(
        &self,
        severity: FeedbackSeverity,
        feedback_type: FeedbackType,
        site_id: &str,
        npc_id: Option<&str>,
    ) -> RoutingOutcome {
        let mut rules: Vec<&RoutingRule> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        for rule in rules {
            if rule.conditions.matches(severity, feedback_type, site_id, npc_id) {
                return RoutingOutcome {
                    assignee: rule.action.assignee.clone(),
                    group: rule.action.group.clone(),
                    sla_hours: rule.action.sla_hours,
                    matched_rule_id: rule.id.clone(),
                };
            }
        }
        RoutingOutcome {
            assignee: None,
            group: self.default_group.clone(),
            sla_hours: self.default_sla_hours,
            matched_rule_id: "default".to_string(),
        }
    }
}
