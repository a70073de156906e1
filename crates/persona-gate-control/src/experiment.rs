// persona-gate-control/src/experiment.rs
// ============================================================================
// Module: Experiment Service
// Description: Experiment lifecycle and deterministic assignment.
// Purpose: Bucket subjects stably and idempotently under concurrency.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! Assignment is deterministic: the CRC32 bucket and the cumulative-weight
//! walk give every subject one variant, and the insert-or-ignore plus
//! re-read makes concurrent callers converge on the first writer's row.
//! Weight changes never move an already-assigned subject.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use persona_gate_core::Experiment;
use persona_gate_core::ExperimentAssignment;
use persona_gate_core::ExperimentConfig;
use persona_gate_core::ExperimentId;
use persona_gate_core::ExperimentStatus;
use persona_gate_core::ExperimentStore;
use persona_gate_core::Scope;
use persona_gate_core::SessionId;
use persona_gate_core::SubjectType;
use persona_gate_core::Timestamp;
use persona_gate_core::UserId;
use persona_gate_core::bucket_hash;
use persona_gate_core::variant_for_bucket;
use uuid::Uuid;

use crate::error::ControlError;

// ============================================================================
// SECTION: Service
// ============================================================================

/// Experiment lifecycle and assignment operations.
pub struct ExperimentService {
    /// Experiments and assignments store.
    store: Arc<dyn ExperimentStore>,
}

impl ExperimentService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self {
            store,
        }
    }

    /// Creates a draft experiment after validating its config.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] when weights are malformed.
    pub fn create(
        &self,
        scope: &Scope,
        name: impl Into<String>,
        description: Option<String>,
        config: ExperimentConfig,
        now: Timestamp,
    ) -> Result<Experiment, ControlError> {
        config.validate().map_err(ControlError::Validation)?;
        let experiment = Experiment {
            id: ExperimentId::new(Uuid::new_v4().to_string()),
            scope: scope.clone(),
            name: name.into(),
            description,
            status: ExperimentStatus::Draft,
            config,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_experiment(&experiment)?;
        Ok(experiment)
    }

    /// Moves an experiment to a new status.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotFound`] when the experiment does not
    /// exist.
    pub fn set_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
        now: Timestamp,
    ) -> Result<(), ControlError> {
        self.store.set_experiment_status(id, status, now)?;
        Ok(())
    }

    /// Assigns using the subject the experiment's config buckets by.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] when the configured subject is
    /// missing from the request, or any error from [`Self::assign`].
    pub fn assign_for(
        &self,
        id: &ExperimentId,
        session_id: &SessionId,
        user_id: Option<&UserId>,
        now: Timestamp,
    ) -> Result<ExperimentAssignment, ControlError> {
        let Some(experiment) = self.store.experiment(id)? else {
            return Err(ControlError::NotFound(format!("experiment {id}")));
        };
        let subject_key = match experiment.config.subject_type {
            SubjectType::SessionId => session_id.as_str().to_string(),
            SubjectType::UserId => user_id
                .map(|user| user.as_str().to_string())
                .ok_or_else(|| {
                    ControlError::Validation(vec![
                        "experiment buckets by user_id but no user was supplied".to_string(),
                    ])
                })?,
        };
        self.assign(id, &subject_key, now)
    }

    /// Returns the stable variant assignment for a subject.
    ///
    /// An existing assignment wins over any recomputation, so later weight
    /// changes never move a subject. Concurrent first calls race on the
    /// unique key and all resolve to the first writer's variant.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::NotFound`] when the experiment does not
    /// exist and [`ControlError::Conflict`] when it is not running.
    pub fn assign(
        &self,
        id: &ExperimentId,
        subject_key: &str,
        now: Timestamp,
    ) -> Result<ExperimentAssignment, ControlError> {
        if let Some(existing) = self.store.assignment(id, subject_key)? {
            return Ok(existing);
        }

        let Some(experiment) = self.store.experiment(id)? else {
            return Err(ControlError::NotFound(format!("experiment {id}")));
        };
        if experiment.status != ExperimentStatus::Active {
            return Err(ControlError::Conflict(format!(
                "experiment {id} is {}, assignment requires active",
                experiment.status
            )));
        }

        let bucket = bucket_hash(id, subject_key);
        let Some(variant) = variant_for_bucket(&experiment.config.variants, bucket) else {
            return Err(ControlError::Validation(vec![
                "experiment has no variants".to_string(),
            ]));
        };
        let assignment = ExperimentAssignment {
            experiment_id: id.clone(),
            scope: experiment.scope.clone(),
            subject_type: experiment.config.subject_type,
            subject_key: subject_key.to_string(),
            variant: variant.name.clone(),
            bucket_hash: bucket,
            strategy_overrides: variant.strategy_overrides.clone(),
            assigned_at: now,
        };
        if self.store.try_insert_assignment(&assignment)? {
            return Ok(assignment);
        }
        // Lost the race; the first writer's row is authoritative.
        self.store
            .assignment(id, subject_key)?
            .ok_or_else(|| ControlError::Conflict("assignment vanished after race".to_string()))
    }
}
