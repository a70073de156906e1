// persona-gate-control/src/release.rs
// ============================================================================
// Module: Release Service and Runtime Config
// Description: Validated release bundles with atomic activation and rollback.
// Purpose: Switch every strategy dial atomically per tenant and site.
// Dependencies: persona-gate-core
// ============================================================================

//! ## Overview
//! Release creation validates every reference in the payload (policy
//! version, prompt versions, experiment liveness, retrieval ranges) and
//! reports the full offence list. Activation and rollback are linearised by
//! the store's single-transaction swap; both record history and admin audit.
//! The runtime config service assembles the bundle the orchestrator runs
//! under, falling back to the active policy when no release is active.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use persona_gate_core::AdminAuditStore;
use persona_gate_core::CatalogStore;
use persona_gate_core::ExperimentId;
use persona_gate_core::ExperimentStatus;
use persona_gate_core::ExperimentStore;
use persona_gate_core::NpcId;
use persona_gate_core::PolicyStore;
use persona_gate_core::Release;
use persona_gate_core::ReleaseAction;
use persona_gate_core::ReleaseHistory;
use persona_gate_core::ReleaseId;
use persona_gate_core::ReleasePayload;
use persona_gate_core::ReleaseStatus;
use persona_gate_core::ReleaseStore;
use persona_gate_core::RetrievalDefaults;
use persona_gate_core::Scope;
use persona_gate_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::admin::record_admin_action;
use crate::error::ControlError;

// ============================================================================
// SECTION: Release Service
// ============================================================================

/// Control-plane operations on release bundles.
pub struct ReleaseService {
    /// Release rows and history.
    releases: Arc<dyn ReleaseStore>,
    /// Policy versions for reference validation.
    policies: Arc<dyn PolicyStore>,
    /// Prompt versions for reference validation.
    catalog: Arc<dyn CatalogStore>,
    /// Experiments for liveness validation.
    experiments: Arc<dyn ExperimentStore>,
    /// Admin audit trail.
    audit: Arc<dyn AdminAuditStore>,
    /// Policy name releases pin versions of.
    policy_name: String,
}

impl ReleaseService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        policies: Arc<dyn PolicyStore>,
        catalog: Arc<dyn CatalogStore>,
        experiments: Arc<dyn ExperimentStore>,
        audit: Arc<dyn AdminAuditStore>,
        policy_name: impl Into<String>,
    ) -> Self {
        Self {
            releases,
            policies,
            catalog,
            experiments,
            audit,
            policy_name: policy_name.into(),
        }
    }

    /// Creates a draft release after validating the payload.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] listing every offending field.
    pub fn create(
        &self,
        scope: &Scope,
        name: impl Into<String>,
        description: Option<String>,
        payload: ReleasePayload,
        created_by: impl Into<String>,
        now: Timestamp,
    ) -> Result<Release, ControlError> {
        self.validate_payload(scope, &payload)?;
        let release = Release {
            id: ReleaseId::new(Uuid::new_v4().to_string()),
            scope: scope.clone(),
            name: name.into(),
            description,
            status: ReleaseStatus::Draft,
            payload,
            created_by: created_by.into(),
            created_at: now,
            activated_at: None,
            archived_at: None,
        };
        self.releases.insert_release(&release)?;
        Ok(release)
    }

    /// Activates a draft release, archiving the previous active bundle.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Conflict`] when the release is not a draft.
    pub fn activate(
        &self,
        id: &ReleaseId,
        operator: &str,
        now: Timestamp,
    ) -> Result<Release, ControlError> {
        let release = self.releases.swap_active(id, ReleaseAction::Activate, operator, now)?;
        record_admin_action(
            self.audit.as_ref(),
            &release.scope,
            operator,
            "release.activate",
            "release",
            release.id.as_str(),
            json!({"name": release.name}),
            now,
        );
        Ok(release)
    }

    /// Rolls back to a previously archived release after re-validation.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Validation`] when the payload no longer
    /// validates, or [`ControlError::Conflict`] when the release is not
    /// archived.
    pub fn rollback(
        &self,
        id: &ReleaseId,
        operator: &str,
        now: Timestamp,
    ) -> Result<Release, ControlError> {
        let Some(target) = self.releases.release(id)? else {
            return Err(ControlError::NotFound(format!("release {id}")));
        };
        // Integrity can rot while archived: a pinned prompt or policy
        // version may have been deleted since.
        self.validate_payload(&target.scope, &target.payload)?;
        let release = self.releases.swap_active(id, ReleaseAction::Rollback, operator, now)?;
        record_admin_action(
            self.audit.as_ref(),
            &release.scope,
            operator,
            "release.rollback",
            "release",
            release.id.as_str(),
            json!({"name": release.name}),
            now,
        );
        Ok(release)
    }

    /// Returns the active release for a scope.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when loading fails.
    pub fn get_active(&self, scope: &Scope) -> Result<Option<Release>, ControlError> {
        Ok(self.releases.active_release(scope)?)
    }

    /// Returns the history rows for a release, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when loading fails.
    pub fn history(&self, id: &ReleaseId) -> Result<Vec<ReleaseHistory>, ControlError> {
        Ok(self.releases.release_history(id)?)
    }

    /// Validates every reference and range in a payload.
    fn validate_payload(
        &self,
        scope: &Scope,
        payload: &ReleasePayload,
    ) -> Result<(), ControlError> {
        let mut offences = Vec::new();

        match self.policies.policy_version(&self.policy_name, &payload.policy_version) {
            Ok(Some(_)) => {}
            Ok(None) => offences.push(format!(
                "payload.policy_version: {} does not exist",
                payload.policy_version
            )),
            Err(err) => offences.push(format!("payload.policy_version: {err}")),
        }

        for (npc_id, version) in &payload.prompts_active {
            let npc = NpcId::new(npc_id.clone());
            match self.catalog.prompt_version(scope, &npc, *version) {
                Ok(Some(_)) => {}
                Ok(None) => offences.push(format!(
                    "payload.prompts_active.{npc_id}: version {version} does not exist"
                )),
                Err(err) => offences.push(format!("payload.prompts_active.{npc_id}: {err}")),
            }
        }

        if let Some(experiment_id) = &payload.experiment_id {
            match self.experiments.experiment(experiment_id) {
                Ok(Some(experiment)) if experiment.status == ExperimentStatus::Completed => {
                    offences
                        .push(format!("payload.experiment_id: {experiment_id} is completed"));
                }
                Ok(Some(_)) => {}
                Ok(None) => offences
                    .push(format!("payload.experiment_id: {experiment_id} does not exist")),
                Err(err) => offences.push(format!("payload.experiment_id: {err}")),
            }
        }

        validate_retrieval_ranges(&payload.retrieval_defaults, &mut offences);

        if offences.is_empty() { Ok(()) } else { Err(ControlError::Validation(offences)) }
    }
}

/// Validates retrieval dial ranges into the offence list.
fn validate_retrieval_ranges(defaults: &RetrievalDefaults, offences: &mut Vec<String>) {
    if defaults.top_k == 0 || defaults.top_k > 50 {
        offences.push("payload.retrieval_defaults.top_k: must be between 1 and 50".to_string());
    }
    if !(0.0..=1.0).contains(&defaults.min_score) {
        offences
            .push("payload.retrieval_defaults.min_score: must be within [0, 1]".to_string());
    }
    if defaults.trgm_weight < 0.0 || defaults.qdrant_weight < 0.0 {
        offences.push("payload.retrieval_defaults: weights must be non-negative".to_string());
    }
}

// ============================================================================
// SECTION: Runtime Config
// ============================================================================

/// Runtime bundle the orchestrator runs one turn under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Active release, when one exists.
    pub release_id: Option<ReleaseId>,
    /// Active release name.
    pub release_name: Option<String>,
    /// Policy version to decide with.
    pub policy_version: Option<String>,
    /// Prompt version pinned for the requested NPC.
    pub prompt_version: Option<u32>,
    /// Experiment running under the release.
    pub experiment_id: Option<ExperimentId>,
    /// Retrieval dials.
    pub retrieval_defaults: RetrievalDefaults,
}

/// Assembles runtime bundles from the active release.
pub struct RuntimeConfigService {
    /// Release rows.
    releases: Arc<dyn ReleaseStore>,
    /// Policy fallback when no release is active.
    policies: Arc<dyn PolicyStore>,
    /// Policy name the fallback reads.
    policy_name: String,
}

impl RuntimeConfigService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        releases: Arc<dyn ReleaseStore>,
        policies: Arc<dyn PolicyStore>,
        policy_name: impl Into<String>,
    ) -> Self {
        Self {
            releases,
            policies,
            policy_name: policy_name.into(),
        }
    }

    /// Returns the runtime bundle for a scope and optional NPC.
    ///
    /// A missing release falls back to "active policy, no experiment".
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] when loading fails.
    pub fn get_config(
        &self,
        scope: &Scope,
        npc_id: Option<&NpcId>,
    ) -> Result<RuntimeConfig, ControlError> {
        if let Some(release) = self.releases.active_release(scope)? {
            let prompt_version =
                npc_id.and_then(|npc| release.payload.prompt_version(npc.as_str()));
            return Ok(RuntimeConfig {
                release_id: Some(release.id),
                release_name: Some(release.name),
                policy_version: Some(release.payload.policy_version),
                prompt_version,
                experiment_id: release.payload.experiment_id,
                retrieval_defaults: release.payload.retrieval_defaults,
            });
        }
        let policy_version =
            self.policies.active_policy(&self.policy_name)?.map(|policy| policy.version);
        Ok(RuntimeConfig {
            release_id: None,
            release_name: None,
            policy_version,
            prompt_version: None,
            experiment_id: None,
            retrieval_defaults: RetrievalDefaults::default(),
        })
    }
}
