// persona-gate-control/src/feedback.rs
// ============================================================================
// Module: Feedback Service and Routing Loader
// Description: Correction intake, rule-based routing, and SLA tracking.
// Purpose: Close the loop from user corrections back to content revisions.
// Dependencies: persona-gate-core, serde_json
// ============================================================================

//! ## Overview
//! Submission routes the ticket through the hot-reloaded rules file
//! (high-priority-first, first match wins) and stamps the SLA deadline.
//! Workflow transitions delegate to the ticket's own monotonic state
//! machine; resolution binds the revision that fixed the issue. The overdue
//! scan flags open tickets past their deadline exactly once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use persona_gate_core::AdminAuditStore;
use persona_gate_core::EvidenceId;
use persona_gate_core::Feedback;
use persona_gate_core::FeedbackId;
use persona_gate_core::FeedbackSeverity;
use persona_gate_core::FeedbackStatus;
use persona_gate_core::FeedbackStore;
use persona_gate_core::FeedbackTransitionError;
use persona_gate_core::FeedbackType;
use persona_gate_core::NpcId;
use persona_gate_core::RoutingPolicy;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use persona_gate_core::TraceId;
use serde_json::json;
use uuid::Uuid;

use crate::admin::record_admin_action;
use crate::error::ControlError;

// ============================================================================
// SECTION: Routing Loader
// ============================================================================

/// Cached routing policy snapshot.
struct RoutingSnapshot {
    /// Loaded policy.
    policy: RoutingPolicy,
    /// Instant the snapshot was taken.
    loaded_at: Instant,
}

/// Hot-reloading loader for the routing rules file.
pub struct RoutingLoader {
    /// Rules file path; `None` always serves the default policy.
    path: Option<PathBuf>,
    /// Snapshot TTL.
    ttl: Duration,
    /// Policy served when the file is missing or malformed.
    default_policy: RoutingPolicy,
    /// Current snapshot.
    snapshot: Mutex<Option<RoutingSnapshot>>,
}

impl RoutingLoader {
    /// Creates a loader over a rules file.
    #[must_use]
    pub fn new(path: Option<PathBuf>, ttl: Duration, default_group: &str, default_sla_hours: i64)
    -> Self {
        Self {
            path,
            ttl,
            default_policy: RoutingPolicy {
                default_group: default_group.to_string(),
                default_sla_hours,
                rules: Vec::new(),
            },
            snapshot: Mutex::new(None),
        }
    }

    /// Returns the routing policy, re-reading the file on TTL expiry.
    ///
    /// A missing or malformed file falls back to the default policy rather
    /// than failing intake.
    #[must_use]
    pub fn load(&self) -> RoutingPolicy {
        {
            let Ok(snapshot) = self.snapshot.lock() else {
                return self.default_policy.clone();
            };
            if let Some(current) = snapshot.as_ref()
                && current.loaded_at.elapsed() < self.ttl
            {
                return current.policy.clone();
            }
        }
        let policy = self.read_policy();
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = Some(RoutingSnapshot {
                policy: policy.clone(),
                loaded_at: Instant::now(),
            });
        }
        policy
    }

    /// Reads and parses the rules file, defaulting on any failure.
    fn read_policy(&self) -> RoutingPolicy {
        let Some(path) = &self.path else {
            return self.default_policy.clone();
        };
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_else(|| self.default_policy.clone())
    }
}

// ============================================================================
// SECTION: Feedback Service
// ============================================================================

/// Feedback intake and workflow operations.
pub struct FeedbackService {
    /// Tickets store.
    store: Arc<dyn FeedbackStore>,
    /// Routing rules loader.
    routing: RoutingLoader,
    /// Admin audit trail.
    audit: Arc<dyn AdminAuditStore>,
}

/// Intake fields for one submission.
#[derive(Debug, Clone)]
pub struct FeedbackSubmission {
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
}

impl FeedbackService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn FeedbackStore>,
        routing: RoutingLoader,
        audit: Arc<dyn AdminAuditStore>,
    ) -> Self {
        Self {
            store,
            routing,
            audit,
        }
    }

    /// Submits a ticket, routing it and stamping the SLA deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when persistence fails.
    pub fn submit(
        &self,
        scope: &Scope,
        submission: FeedbackSubmission,
        now: Timestamp,
    ) -> Result<Feedback, ControlError> {
        let routing = self.routing.load();
        let outcome = routing.route(
            submission.severity,
            submission.feedback_type,
            scope.site_id.as_str(),
            submission.npc_id.as_ref().map(NpcId::as_str),
        );
        let feedback = Feedback {
            id: FeedbackId::new(Uuid::new_v4().to_string()),
            scope: scope.clone(),
            trace_id: submission.trace_id,
            npc_id: submission.npc_id,
            feedback_type: submission.feedback_type,
            severity: submission.severity,
            content: submission.content,
            status: FeedbackStatus::Pending,
            assignee: outcome.assignee,
            group: Some(outcome.group),
            matched_rule_id: Some(outcome.matched_rule_id),
            sla_due_at: Some(now.plus_hours(outcome.sla_hours)),
            overdue_flag: false,
            triaged_at: None,
            in_progress_at: None,
            closed_at: None,
            resolved_by_content_id: None,
            resolved_by_evidence_id: None,
            resolved_by: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_feedback(&feedback)?;
        Ok(feedback)
    }

    /// Moves a ticket into review.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Conflict`] on a forbidden transition.
    pub fn triage(
        &self,
        id: &FeedbackId,
        operator: &str,
        now: Timestamp,
    ) -> Result<Feedback, ControlError> {
        self.transition(id, operator, "feedback.triage", now, |ticket| ticket.triage(now))
    }

    /// Accepts or rejects a ticket out of review.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Conflict`] on a forbidden transition.
    pub fn decide(
        &self,
        id: &FeedbackId,
        accepted: bool,
        operator: &str,
        now: Timestamp,
    ) -> Result<Feedback, ControlError> {
        let action = if accepted { "feedback.accept" } else { "feedback.reject" };
        self.transition(id, operator, action, now, |ticket| ticket.decide(accepted, now))
    }

    /// Resolves a ticket, binding the revision that fixed it.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] when no binding is supplied.
    pub fn resolve(
        &self,
        id: &FeedbackId,
        resolver: &str,
        content_id: Option<String>,
        evidence_id: Option<EvidenceId>,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<Feedback, ControlError> {
        self.transition(id, resolver, "feedback.resolve", now, |ticket| {
            ticket.resolve(resolver, content_id.clone(), evidence_id.clone(), notes.clone(), now)
        })
    }

    /// Archives a resolved ticket.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Conflict`] on a forbidden transition.
    pub fn archive(
        &self,
        id: &FeedbackId,
        operator: &str,
        now: Timestamp,
    ) -> Result<Feedback, ControlError> {
        self.transition(id, operator, "feedback.archive", now, |ticket| ticket.archive(now))
    }

    /// Flags open tickets past their SLA deadline; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when the scan fails.
    pub fn scan_overdue(&self, now: Timestamp) -> Result<u64, ControlError> {
        let candidates = self.store.overdue_candidates(now)?;
        let ids: Vec<FeedbackId> = candidates
            .iter()
            .filter(|ticket| ticket.newly_overdue(now))
            .map(|ticket| ticket.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.store.mark_overdue(&ids, now)?)
    }

    /// Shared load-transition-persist-audit path.
    fn transition(
        &self,
        id: &FeedbackId,
        operator: &str,
        action: &str,
        now: Timestamp,
        apply: impl FnOnce(&mut Feedback) -> Result<(), FeedbackTransitionError>,
    ) -> Result<Feedback, ControlError> {
        let Some(mut ticket) = self.store.feedback(id)? else {
            return Err(ControlError::NotFound(format!("feedback {id}")));
        };
        apply(&mut ticket).map_err(|err| match err {
            FeedbackTransitionError::MissingResolutionBinding => {
                ControlError::Validation(vec![err.to_string()])
            }
            FeedbackTransitionError::Forbidden { .. } => ControlError::Conflict(err.to_string()),
        })?;
        self.store.update_feedback(&ticket)?;
        record_admin_action(
            self.audit.as_ref(),
            &ticket.scope,
            operator,
            action,
            "feedback",
            ticket.id.as_str(),
            json!({"status": ticket.status.as_str()}),
            now,
        );
        Ok(ticket)
    }
}
