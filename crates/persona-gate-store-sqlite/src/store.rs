// persona-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Persona Gate Store
// Description: Durable store for policies, releases, traces, and workflows.
// Purpose: Persist every entity with schema-enforced uniqueness invariants.
// Dependencies: persona-gate-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each table pairs indexed key columns with a JSON snapshot of the entity.
//! Columns are authoritative for mutable flags (active, status, overdue);
//! loaders overwrite the snapshot's copy from the column so a partially
//! patched row can never resurrect stale state. Partial unique indexes
//! enforce the single-active invariants; `INSERT OR IGNORE` plus re-read
//! makes experiment assignment idempotent under concurrency.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use persona_gate_core::AdminAuditEntry;
use persona_gate_core::AdminAuditStore;
use persona_gate_core::AlertEvent;
use persona_gate_core::AlertSilence;
use persona_gate_core::AlertStatus;
use persona_gate_core::AlertStore;
use persona_gate_core::CatalogStore;
use persona_gate_core::Content;
use persona_gate_core::EmbeddingUsage;
use persona_gate_core::Evidence;
use persona_gate_core::EvidenceId;
use persona_gate_core::Experiment;
use persona_gate_core::ExperimentAssignment;
use persona_gate_core::ExperimentId;
use persona_gate_core::ExperimentStatus;
use persona_gate_core::ExperimentStore;
use persona_gate_core::Feedback;
use persona_gate_core::FeedbackId;
use persona_gate_core::FeedbackStore;
use persona_gate_core::GatePolicy;
use persona_gate_core::Message;
use persona_gate_core::MetricError;
use persona_gate_core::MetricSource;
use persona_gate_core::NpcId;
use persona_gate_core::NpcProfile;
use persona_gate_core::NpcPrompt;
use persona_gate_core::PolicyMode;
use persona_gate_core::PolicyStore;
use persona_gate_core::Release;
use persona_gate_core::ReleaseAction;
use persona_gate_core::ReleaseHistory;
use persona_gate_core::ReleaseId;
use persona_gate_core::ReleaseStatus;
use persona_gate_core::ReleaseStore;
use persona_gate_core::Scope;
use persona_gate_core::SiteMap;
use persona_gate_core::StoreError;
use persona_gate_core::TenantId;
use persona_gate_core::Timestamp;
use persona_gate_core::ToolAuditStore;
use persona_gate_core::ToolCallAudit;
use persona_gate_core::TraceId;
use persona_gate_core::TraceRecord;
use persona_gate_core::TraceStatus;
use persona_gate_core::TraceStore;
use persona_gate_core::UsageStore;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::VersionMismatch(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps a rusqlite error into a store error, detecting conflicts.
fn map_db_error(err: &rusqlite::Error, conflict_message: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = err
        && failure.code == ErrorCode::ConstraintViolation
    {
        return StoreError::Conflict(conflict_message.to_string());
    }
    StoreError::Io(err.to_string())
}

// ============================================================================
// SECTION: JSON Helpers
// ============================================================================

/// Serializes an entity snapshot.
fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Deserializes an entity snapshot.
fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed Persona Gate store.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens a store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let connection = Connection::open(&config.path)
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Self::from_connection(connection, config.busy_timeout_ms)
    }

    /// Opens an in-memory store (tests and development).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()
            .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        Self::from_connection(connection, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Applies pragmas and the schema to a fresh connection.
    fn from_connection(
        connection: Connection,
        busy_timeout_ms: u64,
    ) -> Result<Self, SqliteStoreError> {
        connection
            .busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "journal_mode", "wal")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "synchronous", "normal")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .pragma_update(None, "foreign_keys", "on")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Io("store mutex poisoned".to_string()))
    }
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Initializes tables, indexes, and the schema version marker.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS policies (
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                policy_json TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (name, version)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_policies_active
                ON policies (name) WHERE is_active = 1;
            CREATE TABLE IF NOT EXISTS releases (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                status TEXT NOT NULL,
                release_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_releases_active
                ON releases (tenant_id, site_id) WHERE status = 'active';
            CREATE TABLE IF NOT EXISTS release_history (
                id TEXT PRIMARY KEY,
                release_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                action TEXT NOT NULL,
                previous_release_id TEXT,
                operator TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_release_history_release
                ON release_history (release_id, created_at);
            CREATE TABLE IF NOT EXISTS experiments (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                status TEXT NOT NULL,
                experiment_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS experiment_assignments (
                experiment_id TEXT NOT NULL,
                subject_key TEXT NOT NULL,
                assignment_json TEXT NOT NULL,
                assigned_at INTEGER NOT NULL,
                PRIMARY KEY (experiment_id, subject_key)
            );
            CREATE TABLE IF NOT EXISTS traces (
                trace_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                status TEXT NOT NULL,
                trace_json TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                completed_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS ix_traces_session
                ON traces (tenant_id, site_id, session_id, started_at);
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                message_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_messages_session
                ON messages (tenant_id, site_id, session_id, created_at);
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                status TEXT NOT NULL,
                overdue_flag INTEGER NOT NULL DEFAULT 0,
                sla_due_at INTEGER,
                feedback_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_feedback_sla
                ON feedback (status, overdue_flag, sla_due_at);
            CREATE TABLE IF NOT EXISTS alerts_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT,
                alert_code TEXT NOT NULL,
                status TEXT NOT NULL,
                dedup_key TEXT NOT NULL,
                event_json TEXT NOT NULL,
                first_seen_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_alerts_firing
                ON alerts_events (dedup_key) WHERE status = 'firing';
            CREATE INDEX IF NOT EXISTS ix_alerts_tenant_status
                ON alerts_events (tenant_id, status);
            CREATE TABLE IF NOT EXISTS alerts_silences (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                silence_json TEXT NOT NULL,
                starts_at INTEGER NOT NULL,
                ends_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_silences_window
                ON alerts_silences (tenant_id, starts_at, ends_at);
            CREATE TABLE IF NOT EXISTS npc_profiles (
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                npc_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                profile_json TEXT NOT NULL,
                PRIMARY KEY (tenant_id, site_id, npc_id, version)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_profiles_active
                ON npc_profiles (tenant_id, site_id, npc_id) WHERE active = 1;
            CREATE TABLE IF NOT EXISTS npc_prompts (
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                npc_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 0,
                prompt_json TEXT NOT NULL,
                PRIMARY KEY (tenant_id, site_id, npc_id, version)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS ux_prompts_active
                ON npc_prompts (tenant_id, site_id, npc_id) WHERE active = 1;
            CREATE TABLE IF NOT EXISTS evidences (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                evidence_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_evidences_scope
                ON evidences (tenant_id, site_id, created_at);
            CREATE TABLE IF NOT EXISTS contents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                lifecycle TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                content_type TEXT NOT NULL,
                content_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS ix_contents_scope
                ON contents (tenant_id, site_id, lifecycle);
            CREATE TABLE IF NOT EXISTS site_maps (
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                map_json TEXT NOT NULL,
                PRIMARY KEY (tenant_id, site_id)
            );
            CREATE TABLE IF NOT EXISTS analytics_events (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS admin_audit_log (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                entry_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tool_call_audit (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                audit_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS embedding_usage (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                usage_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;

    let existing: Option<i64> = connection
        .query_row("SELECT value FROM schema_meta WHERE key = 'schema_version'", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match existing {
        Some(version) if version != SCHEMA_VERSION => Err(SqliteStoreError::VersionMismatch(
            format!("found schema version {version}, expected {SCHEMA_VERSION}"),
        )),
        Some(_) => Ok(()),
        None => {
            connection
                .execute(
                    "INSERT INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

impl PolicyStore for SqliteStore {
    fn active_policy(&self, name: &str) -> Result<Option<GatePolicy>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT policy_json FROM policies WHERE name = ?1 AND is_active = 1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| {
            let mut policy: GatePolicy = from_json(&raw)?;
            policy.is_active = true;
            Ok(policy)
        })
        .transpose()
    }

    fn policy_version(&self, name: &str, version: &str) -> Result<Option<GatePolicy>, StoreError> {
        let guard = self.lock()?;
        let row: Option<(String, i64)> = guard
            .query_row(
                "SELECT policy_json, is_active FROM policies WHERE name = ?1 AND version = ?2",
                params![name, version],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|(raw, active)| {
            let mut policy: GatePolicy = from_json(&raw)?;
            policy.is_active = active != 0;
            Ok(policy)
        })
        .transpose()
    }

    fn list_policy_versions(&self, name: &str) -> Result<Vec<GatePolicy>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT policy_json, is_active FROM policies WHERE name = ?1
                 ORDER BY created_at DESC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![name], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut policies = Vec::new();
        for row in rows {
            let (raw, active) = row.map_err(|err| StoreError::Io(err.to_string()))?;
            let mut policy: GatePolicy = from_json(&raw)?;
            policy.is_active = active != 0;
            policies.push(policy);
        }
        Ok(policies)
    }

    fn insert_policy(&self, policy: &GatePolicy) -> Result<(), StoreError> {
        let raw = to_json(policy)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        if policy.is_active {
            tx.execute(
                "UPDATE policies SET is_active = 0 WHERE name = ?1 AND is_active = 1",
                params![policy.name],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        }
        tx.execute(
            "INSERT INTO policies (name, version, is_active, policy_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                policy.name,
                policy.version,
                i64::from(policy.is_active),
                raw,
                policy.created_at.as_unix_millis(),
            ],
        )
        .map_err(|err| map_db_error(&err, "policy version already exists"))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn set_active_policy(&self, name: &str, version: &str) -> Result<GatePolicy, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT policy_json FROM policies WHERE name = ?1 AND version = ?2",
                params![name, version],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(format!("policy {name} version {version}")));
        };
        tx.execute(
            "UPDATE policies SET is_active = 0 WHERE name = ?1 AND is_active = 1",
            params![name],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.execute(
            "UPDATE policies SET is_active = 1 WHERE name = ?1 AND version = ?2",
            params![name, version],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        let mut policy: GatePolicy = from_json(&raw)?;
        policy.is_active = true;
        Ok(policy)
    }
}

// ============================================================================
// SECTION: Release Store
// ============================================================================

impl ReleaseStore for SqliteStore {
    fn insert_release(&self, release: &Release) -> Result<(), StoreError> {
        let raw = to_json(release)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO releases (id, tenant_id, site_id, status, release_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    release.id.as_str(),
                    release.scope.tenant_id.as_str(),
                    release.scope.site_id.as_str(),
                    release.status.as_str(),
                    raw,
                    release.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "release already exists"))?;
        Ok(())
    }

    fn release(&self, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
        let guard = self.lock()?;
        load_release(&guard, id)
    }

    fn active_release(&self, scope: &Scope) -> Result<Option<Release>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT release_json FROM releases
                 WHERE tenant_id = ?1 AND site_id = ?2 AND status = 'active'",
                params![scope.tenant_id.as_str(), scope.site_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn swap_active(
        &self,
        id: &ReleaseId,
        action: ReleaseAction,
        operator: &str,
        now: Timestamp,
    ) -> Result<Release, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;

        let Some(mut target) = load_release_tx(&tx, id)? else {
            return Err(StoreError::NotFound(format!("release {id}")));
        };
        let expected = match action {
            ReleaseAction::Activate => ReleaseStatus::Draft,
            ReleaseAction::Rollback => ReleaseStatus::Archived,
        };
        if target.status != expected {
            return Err(StoreError::Conflict(format!(
                "release {id} is {}, {action} requires {expected}",
                target.status
            )));
        }

        let previous: Option<String> = tx
            .query_row(
                "SELECT id FROM releases
                 WHERE tenant_id = ?1 AND site_id = ?2 AND status = 'active'",
                params![target.scope.tenant_id.as_str(), target.scope.site_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let previous_id = previous.map(ReleaseId::new);

        if let Some(previous_id) = &previous_id {
            let Some(mut previous_release) = load_release_tx(&tx, previous_id)? else {
                return Err(StoreError::Corrupt(format!("active release {previous_id} missing")));
            };
            previous_release.status = ReleaseStatus::Archived;
            previous_release.archived_at = Some(now);
            store_release_tx(&tx, &previous_release)?;
        }

        target.status = ReleaseStatus::Active;
        target.activated_at = Some(now);
        target.archived_at = None;
        store_release_tx(&tx, &target)?;

        tx.execute(
            "INSERT INTO release_history (
                id, release_id, tenant_id, site_id, action,
                previous_release_id, operator, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                target.id.as_str(),
                target.scope.tenant_id.as_str(),
                target.scope.site_id.as_str(),
                action.as_str(),
                previous_id.as_ref().map(ReleaseId::as_str),
                operator,
                now.as_unix_millis(),
            ],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;

        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(target)
    }

    fn release_history(&self, id: &ReleaseId) -> Result<Vec<ReleaseHistory>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT id, release_id, tenant_id, site_id, action,
                        previous_release_id, operator, created_at
                 FROM release_history WHERE release_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut history = Vec::new();
        for row in rows {
            let (row_id, release_id, tenant, site, action, previous, operator, created_at) =
                row.map_err(|err| StoreError::Io(err.to_string()))?;
            let action = match action.as_str() {
                "activate" => ReleaseAction::Activate,
                "rollback" => ReleaseAction::Rollback,
                other => {
                    return Err(StoreError::Corrupt(format!("unknown release action {other}")));
                }
            };
            history.push(ReleaseHistory {
                id: row_id,
                release_id: ReleaseId::new(release_id),
                scope: Scope::new(tenant, site),
                action,
                previous_release_id: previous.map(ReleaseId::new),
                operator,
                created_at: Timestamp::from_unix_millis(created_at),
            });
        }
        Ok(history)
    }
}

/// Loads a release by id outside a transaction.
fn load_release(connection: &Connection, id: &ReleaseId) -> Result<Option<Release>, StoreError> {
    let row: Option<String> = connection
        .query_row(
            "SELECT release_json FROM releases WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| StoreError::Io(err.to_string()))?;
    row.map(|raw| from_json(&raw)).transpose()
}

/// Loads a release by id within a transaction.
fn load_release_tx(
    tx: &rusqlite::Transaction<'_>,
    id: &ReleaseId,
) -> Result<Option<Release>, StoreError> {
    let row: Option<String> = tx
        .query_row(
            "SELECT release_json FROM releases WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| StoreError::Io(err.to_string()))?;
    row.map(|raw| from_json(&raw)).transpose()
}

/// Writes a release row back within a transaction.
fn store_release_tx(tx: &rusqlite::Transaction<'_>, release: &Release) -> Result<(), StoreError> {
    let raw = to_json(release)?;
    tx.execute(
        "UPDATE releases SET status = ?2, release_json = ?3 WHERE id = ?1",
        params![release.id.as_str(), release.status.as_str(), raw],
    )
    .map_err(|err| map_db_error(&err, "concurrent release activation"))?;
    Ok(())
}

// ============================================================================
// SECTION: Experiment Store
// ============================================================================

impl ExperimentStore for SqliteStore {
    fn insert_experiment(&self, experiment: &Experiment) -> Result<(), StoreError> {
        let raw = to_json(experiment)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO experiments (
                    id, tenant_id, site_id, status, experiment_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    experiment.id.as_str(),
                    experiment.scope.tenant_id.as_str(),
                    experiment.scope.site_id.as_str(),
                    experiment.status.as_str(),
                    raw,
                    experiment.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "experiment already exists"))?;
        Ok(())
    }

    fn experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT experiment_json FROM experiments WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn set_experiment_status(
        &self,
        id: &ExperimentId,
        status: ExperimentStatus,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT experiment_json FROM experiments WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(format!("experiment {id}")));
        };
        let mut experiment: Experiment = from_json(&raw)?;
        experiment.status = status;
        experiment.updated_at = now;
        let updated = to_json(&experiment)?;
        tx.execute(
            "UPDATE experiments SET status = ?2, experiment_json = ?3 WHERE id = ?1",
            params![id.as_str(), status.as_str(), updated],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn assignment(
        &self,
        id: &ExperimentId,
        subject_key: &str,
    ) -> Result<Option<ExperimentAssignment>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT assignment_json FROM experiment_assignments
                 WHERE experiment_id = ?1 AND subject_key = ?2",
                params![id.as_str(), subject_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn try_insert_assignment(
        &self,
        assignment: &ExperimentAssignment,
    ) -> Result<bool, StoreError> {
        let raw = to_json(assignment)?;
        let guard = self.lock()?;
        let inserted = guard
            .execute(
                "INSERT OR IGNORE INTO experiment_assignments (
                    experiment_id, subject_key, assignment_json, assigned_at
                 ) VALUES (?1, ?2, ?3, ?4)",
                params![
                    assignment.experiment_id.as_str(),
                    assignment.subject_key,
                    raw,
                    assignment.assigned_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(inserted > 0)
    }
}

// ============================================================================
// SECTION: Trace Store
// ============================================================================

impl TraceStore for SqliteStore {
    fn commit_turn(
        &self,
        trace: &TraceRecord,
        message: Option<&Message>,
    ) -> Result<(), StoreError> {
        let trace_raw = to_json(trace)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        tx.execute(
            "INSERT INTO traces (
                trace_id, tenant_id, site_id, session_id, status,
                trace_json, started_at, completed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                trace.trace_id.as_str(),
                trace.scope.tenant_id.as_str(),
                trace.scope.site_id.as_str(),
                trace.session_id.as_str(),
                trace.status.as_str(),
                trace_raw,
                trace.started_at.as_unix_millis(),
                trace.completed_at.map(Timestamp::as_unix_millis),
            ],
        )
        .map_err(|err| map_db_error(&err, "trace id already committed"))?;
        if let Some(message) = message {
            let message_raw = to_json(message)?;
            tx.execute(
                "INSERT INTO messages (
                    id, tenant_id, site_id, session_id, message_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.scope.tenant_id.as_str(),
                    message.scope.site_id.as_str(),
                    message.session_id.as_str(),
                    message_raw,
                    message.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "message already committed"))?;
        }
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn trace_by_id(&self, trace_id: &TraceId) -> Result<Option<TraceRecord>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT trace_json FROM traces WHERE trace_id = ?1",
                params![trace_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }
}

// ============================================================================
// SECTION: Feedback Store
// ============================================================================

impl FeedbackStore for SqliteStore {
    fn insert_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        let raw = to_json(feedback)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO feedback (
                    id, tenant_id, site_id, status, overdue_flag,
                    sla_due_at, feedback_json, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    feedback.id.as_str(),
                    feedback.scope.tenant_id.as_str(),
                    feedback.scope.site_id.as_str(),
                    feedback.status.as_str(),
                    i64::from(feedback.overdue_flag),
                    feedback.sla_due_at.map(Timestamp::as_unix_millis),
                    raw,
                    feedback.updated_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "feedback already exists"))?;
        Ok(())
    }

    fn feedback(&self, id: &FeedbackId) -> Result<Option<Feedback>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT feedback_json FROM feedback WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn update_feedback(&self, feedback: &Feedback) -> Result<(), StoreError> {
        let raw = to_json(feedback)?;
        let guard = self.lock()?;
        let updated = guard
            .execute(
                "UPDATE feedback SET status = ?2, overdue_flag = ?3, sla_due_at = ?4,
                        feedback_json = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    feedback.id.as_str(),
                    feedback.status.as_str(),
                    i64::from(feedback.overdue_flag),
                    feedback.sla_due_at.map(Timestamp::as_unix_millis),
                    raw,
                    feedback.updated_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("feedback {}", feedback.id)));
        }
        Ok(())
    }

    fn overdue_candidates(&self, now: Timestamp) -> Result<Vec<Feedback>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT feedback_json FROM feedback
                 WHERE overdue_flag = 0
                   AND status NOT IN ('resolved', 'archived')
                   AND sla_due_at IS NOT NULL AND sla_due_at < ?1",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![now.as_unix_millis()], |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut candidates = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| StoreError::Io(err.to_string()))?;
            candidates.push(from_json(&raw)?);
        }
        Ok(candidates)
    }

    fn mark_overdue(&self, ids: &[FeedbackId], now: Timestamp) -> Result<u64, StoreError> {
        let mut marked = 0_u64;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        for id in ids {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT feedback_json FROM feedback WHERE id = ?1 AND overdue_flag = 0",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Io(err.to_string()))?;
            let Some(raw) = raw else { continue };
            let mut feedback: Feedback = from_json(&raw)?;
            feedback.overdue_flag = true;
            feedback.updated_at = now;
            let updated = to_json(&feedback)?;
            tx.execute(
                "UPDATE feedback SET overdue_flag = 1, feedback_json = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id.as_str(), updated, now.as_unix_millis()],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
            marked += 1;
        }
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(marked)
    }
}

// ============================================================================
// SECTION: Alert Store
// ============================================================================

impl AlertStore for SqliteStore {
    fn firing_event(&self, dedup_key: &str) -> Result<Option<AlertEvent>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT event_json FROM alerts_events
                 WHERE dedup_key = ?1 AND status = 'firing'",
                params![dedup_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn insert_event(&self, event: &AlertEvent) -> Result<(), StoreError> {
        let raw = to_json(event)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO alerts_events (
                    id, tenant_id, site_id, alert_code, status, dedup_key,
                    event_json, first_seen_at, last_seen_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.id,
                    event.tenant_id.as_str(),
                    event.site_id.as_ref().map(|site| site.as_str()),
                    event.alert_code,
                    event.status.as_str(),
                    event.dedup_key,
                    raw,
                    event.first_seen_at.as_unix_millis(),
                    event.last_seen_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "firing event already exists for dedup key"))?;
        Ok(())
    }

    fn touch_event(&self, dedup_key: &str, value: f64, now: Timestamp) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT event_json FROM alerts_events
                 WHERE dedup_key = ?1 AND status = 'firing'",
                params![dedup_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(format!("firing event for {dedup_key}")));
        };
        let mut event: AlertEvent = from_json(&raw)?;
        event.current_value = value;
        event.last_seen_at = now;
        let updated = to_json(&event)?;
        tx.execute(
            "UPDATE alerts_events SET event_json = ?2, last_seen_at = ?3
             WHERE dedup_key = ?1 AND status = 'firing'",
            params![dedup_key, updated, now.as_unix_millis()],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn resolve_event(&self, dedup_key: &str, now: Timestamp) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT event_json FROM alerts_events
                 WHERE dedup_key = ?1 AND status = 'firing'",
                params![dedup_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let Some(raw) = raw else {
            tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
            return Ok(false);
        };
        let mut event: AlertEvent = from_json(&raw)?;
        event.status = AlertStatus::Resolved;
        event.resolved_at = Some(now);
        let updated = to_json(&event)?;
        tx.execute(
            "UPDATE alerts_events SET status = 'resolved', event_json = ?2
             WHERE dedup_key = ?1 AND status = 'firing'",
            params![dedup_key, updated],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(true)
    }

    fn mark_webhook_sent(&self, event_id: &str, now: Timestamp) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        let raw: Option<String> = tx
            .query_row(
                "SELECT event_json FROM alerts_events WHERE id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound(format!("alert event {event_id}")));
        };
        let mut event: AlertEvent = from_json(&raw)?;
        event.webhook_sent = true;
        event.webhook_sent_at = Some(now);
        let updated = to_json(&event)?;
        tx.execute(
            "UPDATE alerts_events SET event_json = ?2 WHERE id = ?1",
            params![event_id, updated],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn active_silences(
        &self,
        tenant_id: &TenantId,
        now: Timestamp,
    ) -> Result<Vec<AlertSilence>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT silence_json FROM alerts_silences
                 WHERE tenant_id = ?1 AND starts_at <= ?2 AND ends_at >= ?2",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![tenant_id.as_str(), now.as_unix_millis()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut silences = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| StoreError::Io(err.to_string()))?;
            silences.push(from_json(&raw)?);
        }
        Ok(silences)
    }

    fn insert_silence(&self, silence: &AlertSilence) -> Result<(), StoreError> {
        let raw = to_json(silence)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO alerts_silences (id, tenant_id, silence_json, starts_at, ends_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    silence.id,
                    silence.tenant_id.as_str(),
                    raw,
                    silence.starts_at.as_unix_millis(),
                    silence.ends_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "silence already exists"))?;
        Ok(())
    }

    fn delete_silence(&self, id: &str) -> Result<bool, StoreError> {
        let guard = self.lock()?;
        let deleted = guard
            .execute("DELETE FROM alerts_silences WHERE id = ?1", params![id])
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(deleted > 0)
    }
}

// ============================================================================
// SECTION: Catalog Store
// ============================================================================

impl CatalogStore for SqliteStore {
    fn active_profile(
        &self,
        scope: &Scope,
        npc_id: &NpcId,
    ) -> Result<Option<NpcProfile>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT profile_json FROM npc_profiles
                 WHERE tenant_id = ?1 AND site_id = ?2 AND npc_id = ?3 AND active = 1",
                params![scope.tenant_id.as_str(), scope.site_id.as_str(), npc_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| {
            let mut profile: NpcProfile = from_json(&raw)?;
            profile.active = true;
            Ok(profile)
        })
        .transpose()
    }

    fn upsert_profile(&self, profile: &NpcProfile) -> Result<(), StoreError> {
        let raw = to_json(profile)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        if profile.active {
            tx.execute(
                "UPDATE npc_profiles SET active = 0
                 WHERE tenant_id = ?1 AND site_id = ?2 AND npc_id = ?3 AND active = 1",
                params![
                    profile.scope.tenant_id.as_str(),
                    profile.scope.site_id.as_str(),
                    profile.npc_id.as_str(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO npc_profiles (
                tenant_id, site_id, npc_id, version, active, profile_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                profile.scope.tenant_id.as_str(),
                profile.scope.site_id.as_str(),
                profile.npc_id.as_str(),
                profile.version,
                i64::from(profile.active),
                raw,
            ],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn active_prompt(
        &self,
        scope: &Scope,
        npc_id: &NpcId,
    ) -> Result<Option<NpcPrompt>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT prompt_json FROM npc_prompts
                 WHERE tenant_id = ?1 AND site_id = ?2 AND npc_id = ?3 AND active = 1",
                params![scope.tenant_id.as_str(), scope.site_id.as_str(), npc_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| {
            let mut prompt: NpcPrompt = from_json(&raw)?;
            prompt.active = true;
            Ok(prompt)
        })
        .transpose()
    }

    fn prompt_version(
        &self,
        scope: &Scope,
        npc_id: &NpcId,
        version: u32,
    ) -> Result<Option<NpcPrompt>, StoreError> {
        let guard = self.lock()?;
        let row: Option<(String, i64)> = guard
            .query_row(
                "SELECT prompt_json, active FROM npc_prompts
                 WHERE tenant_id = ?1 AND site_id = ?2 AND npc_id = ?3 AND version = ?4",
                params![
                    scope.tenant_id.as_str(),
                    scope.site_id.as_str(),
                    npc_id.as_str(),
                    version,
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|(raw, active)| {
            let mut prompt: NpcPrompt = from_json(&raw)?;
            prompt.active = active != 0;
            Ok(prompt)
        })
        .transpose()
    }

    fn upsert_prompt(&self, prompt: &NpcPrompt) -> Result<(), StoreError> {
        let raw = to_json(prompt)?;
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(|err| StoreError::Io(err.to_string()))?;
        if prompt.active {
            tx.execute(
                "UPDATE npc_prompts SET active = 0
                 WHERE tenant_id = ?1 AND site_id = ?2 AND npc_id = ?3 AND active = 1",
                params![
                    prompt.scope.tenant_id.as_str(),
                    prompt.scope.site_id.as_str(),
                    prompt.npc_id.as_str(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO npc_prompts (
                tenant_id, site_id, npc_id, version, active, prompt_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prompt.scope.tenant_id.as_str(),
                prompt.scope.site_id.as_str(),
                prompt.npc_id.as_str(),
                prompt.version,
                i64::from(prompt.active),
                raw,
            ],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Io(err.to_string()))
    }

    fn insert_evidence(&self, evidence: &Evidence) -> Result<(), StoreError> {
        let raw = to_json(evidence)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO evidences (id, tenant_id, site_id, evidence_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    evidence.id.as_str(),
                    evidence.scope.tenant_id.as_str(),
                    evidence.scope.site_id.as_str(),
                    raw,
                    evidence.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "evidence already exists"))?;
        Ok(())
    }

    fn evidence_by_ids(
        &self,
        scope: &Scope,
        ids: &[EvidenceId],
    ) -> Result<Vec<Evidence>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT evidence_json FROM evidences
                 WHERE tenant_id = ?1 AND site_id = ?2 AND id = ?3",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut found = Vec::new();
        for id in ids {
            let row: Option<String> = statement
                .query_row(
                    params![scope.tenant_id.as_str(), scope.site_id.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| StoreError::Io(err.to_string()))?;
            if let Some(raw) = row {
                found.push(from_json(&raw)?);
            }
        }
        Ok(found)
    }

    fn evidence_in_domains(
        &self,
        scope: &Scope,
        domains: &[String],
        limit: usize,
    ) -> Result<Vec<Evidence>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT evidence_json FROM evidences
                 WHERE tenant_id = ?1 AND site_id = ?2 ORDER BY created_at DESC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(params![scope.tenant_id.as_str(), scope.site_id.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut matching = Vec::new();
        for row in rows {
            if matching.len() >= limit {
                break;
            }
            let raw = row.map_err(|err| StoreError::Io(err.to_string()))?;
            let evidence: Evidence = from_json(&raw)?;
            if domains.is_empty()
                || evidence.domains.iter().any(|domain| domains.contains(domain))
            {
                matching.push(evidence);
            }
        }
        Ok(matching)
    }

    fn insert_content(&self, content: &Content) -> Result<(), StoreError> {
        let raw = to_json(content)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO contents (
                    id, tenant_id, site_id, lifecycle, title, body,
                    content_type, content_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    content.id,
                    content.scope.tenant_id.as_str(),
                    content.scope.site_id.as_str(),
                    content.lifecycle.as_str(),
                    content.title,
                    content.body,
                    content.content_type,
                    raw,
                    content.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| map_db_error(&err, "content already exists"))?;
        Ok(())
    }

    fn search_content(
        &self,
        scope: &Scope,
        keyword: &str,
        content_type: Option<&str>,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Content>, StoreError> {
        let pattern = format!("%{keyword}%");
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT content_json FROM contents
                 WHERE tenant_id = ?1 AND site_id = ?2
                   AND (title LIKE ?3 OR body LIKE ?3)
                 ORDER BY created_at DESC",
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let rows = statement
            .query_map(
                params![scope.tenant_id.as_str(), scope.site_id.as_str(), pattern],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let mut results = Vec::new();
        for row in rows {
            if results.len() >= limit {
                break;
            }
            let raw = row.map_err(|err| StoreError::Io(err.to_string()))?;
            let content: Content = from_json(&raw)?;
            if let Some(expected) = content_type
                && content.content_type != expected
            {
                continue;
            }
            if !tags.is_empty() && !tags.iter().any(|tag| content.tags.contains(tag)) {
                continue;
            }
            results.push(content);
        }
        Ok(results)
    }

    fn site_map(&self, scope: &Scope) -> Result<Option<SiteMap>, StoreError> {
        let guard = self.lock()?;
        let row: Option<String> = guard
            .query_row(
                "SELECT map_json FROM site_maps WHERE tenant_id = ?1 AND site_id = ?2",
                params![scope.tenant_id.as_str(), scope.site_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Io(err.to_string()))?;
        row.map(|raw| from_json(&raw)).transpose()
    }

    fn upsert_site_map(&self, map: &SiteMap) -> Result<(), StoreError> {
        let raw = to_json(map)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT OR REPLACE INTO site_maps (tenant_id, site_id, map_json)
                 VALUES (?1, ?2, ?3)",
                params![map.scope.tenant_id.as_str(), map.scope.site_id.as_str(), raw],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn log_user_event(
        &self,
        scope: &Scope,
        event_type: &str,
        payload: &serde_json::Value,
        created_at: Timestamp,
    ) -> Result<(), StoreError> {
        let raw = to_json(payload)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO analytics_events (
                    id, tenant_id, site_id, event_type, payload_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    scope.tenant_id.as_str(),
                    scope.site_id.as_str(),
                    event_type,
                    raw,
                    created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Stores
// ============================================================================

// ============================================================================
// SECTION: Metric Source
// ============================================================================

/// Expression label for the conservative-or-refuse share of turns.
const EXPR_FALLBACK_RATE: &str = "fallback_rate";
/// Expression label for the failed share of turns.
const EXPR_LLM_ERROR_RATE: &str = "llm_error_rate";
/// Expression label for the timed-out share of turns.
const EXPR_TIMEOUT_RATE: &str = "timeout_rate";
/// Expression label for the p95 turn latency.
const EXPR_P95_LATENCY_MS: &str = "p95_latency_ms";
/// Expression label for the turn count.
const EXPR_TRACE_COUNT: &str = "trace_count";

/// Parses a window label (`15m`, `1h`, `24h`) into milliseconds.
fn window_millis(window: &str) -> i64 {
    let (digits, unit): (String, String) = window.chars().partition(char::is_ascii_digit);
    let amount: i64 = digits.parse().unwrap_or(15);
    match unit.as_str() {
        "h" => amount.saturating_mul(3_600_000),
        "d" => amount.saturating_mul(86_400_000),
        _ => amount.saturating_mul(60_000),
    }
}

/// Current wall-clock time in unix milliseconds.
fn wall_clock_millis() -> i64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(millis).unwrap_or(0)
}

impl SqliteStore {
    /// Loads the traces inside a window for one scope.
    fn traces_in_window(
        &self,
        tenant_id: &TenantId,
        site_id: Option<&str>,
        window: &str,
    ) -> Result<Vec<TraceRecord>, MetricError> {
        let cutoff = wall_clock_millis().saturating_sub(window_millis(window));
        let guard =
            self.lock().map_err(|err| MetricError::Source(err.to_string()))?;
        let mut traces = Vec::new();
        let mut statement = guard
            .prepare(
                "SELECT trace_json FROM traces
                 WHERE tenant_id = ?1 AND started_at >= ?2
                   AND (?3 IS NULL OR site_id = ?3)",
            )
            .map_err(|err| MetricError::Source(err.to_string()))?;
        let rows = statement
            .query_map(params![tenant_id.as_str(), cutoff, site_id], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|err| MetricError::Source(err.to_string()))?;
        for row in rows {
            let raw = row.map_err(|err| MetricError::Source(err.to_string()))?;
            if let Ok(trace) = serde_json::from_str::<TraceRecord>(&raw) {
                traces.push(trace);
            }
        }
        Ok(traces)
    }
}

impl MetricSource for SqliteStore {
    fn current_value(
        &self,
        tenant_id: &TenantId,
        site_id: Option<&str>,
        expr: &str,
        window: &str,
    ) -> Result<f64, MetricError> {
        let traces = self.traces_in_window(tenant_id, site_id, window)?;
        let total = u32::try_from(traces.len()).unwrap_or(u32::MAX);
        let share = |count: usize| {
            if total == 0 {
                0.0
            } else {
                f64::from(u32::try_from(count).unwrap_or(u32::MAX)) / f64::from(total)
            }
        };
        match expr {
            EXPR_TRACE_COUNT => Ok(f64::from(total)),
            EXPR_FALLBACK_RATE => Ok(share(
                traces
                    .iter()
                    .filter(|trace| {
                        matches!(
                            trace.policy_mode,
                            PolicyMode::Conservative | PolicyMode::Refuse
                        )
                    })
                    .count(),
            )),
            EXPR_LLM_ERROR_RATE => Ok(share(
                traces.iter().filter(|trace| trace.status == TraceStatus::Failed).count(),
            )),
            EXPR_TIMEOUT_RATE => Ok(share(
                traces.iter().filter(|trace| trace.status == TraceStatus::Timeout).count(),
            )),
            EXPR_P95_LATENCY_MS => {
                let mut latencies: Vec<u64> =
                    traces.iter().filter_map(|trace| trace.latency_ms).collect();
                if latencies.is_empty() {
                    return Ok(0.0);
                }
                latencies.sort_unstable();
                let rank = latencies.len().saturating_mul(95).div_ceil(100).max(1);
                let value = latencies[rank - 1];
                Ok(u32::try_from(value).map_or(f64::from(u32::MAX), f64::from))
            }
            other => Err(MetricError::UnknownExpression(other.to_string())),
        }
    }
}

impl AdminAuditStore for SqliteStore {
    fn append_admin_audit(&self, entry: &AdminAuditEntry) -> Result<(), StoreError> {
        let raw = to_json(entry)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO admin_audit_log (id, tenant_id, site_id, entry_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id,
                    entry.scope.tenant_id.as_str(),
                    entry.scope.site_id.as_str(),
                    raw,
                    entry.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }
}

impl ToolAuditStore for SqliteStore {
    fn append_tool_audit(&self, audit: &ToolCallAudit) -> Result<(), StoreError> {
        let raw = to_json(audit)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO tool_call_audit (id, tenant_id, site_id, audit_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    audit.id,
                    audit.scope.tenant_id.as_str(),
                    audit.scope.site_id.as_str(),
                    raw,
                    audit.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }
}

impl UsageStore for SqliteStore {
    fn append_embedding_usage(&self, usage: &EmbeddingUsage) -> Result<(), StoreError> {
        let raw = to_json(usage)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO embedding_usage (id, tenant_id, site_id, usage_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    usage.id,
                    usage.scope.tenant_id.as_str(),
                    usage.scope.site_id.as_str(),
                    raw,
                    usage.created_at.as_unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(())
    }
}
