// warden-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Governance Store
// Description: Durable persistence contract over SQLite WAL.
// Purpose: Persist audit, policy, agent, and approval state append-only.
// Dependencies: warden-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`GovernanceStore`] and [`ApprovalStore`] over an
//! embedded `SQLite` database. The audit table is append-only: `BEFORE
//! UPDATE` and `BEFORE DELETE` triggers abort with a message naming the
//! constraint, so tampering fails at the storage boundary. Chain hashes are
//! computed under the connection lock, which linearizes chain order with
//! record id order. Free-text search escapes LIKE metacharacters so user
//! input is always treated as literal. Tenant-scoped handles share the
//! connection and scope approval rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use thiserror::Error;
use warden_core::AgentConfig;
use warden_core::AgentId;
use warden_core::AgentStatus;
use warden_core::ApprovalDecision;
use warden_core::ApprovalRequest;
use warden_core::ApprovalResolution;
use warden_core::ApprovalStatus;
use warden_core::AuditRecord;
use warden_core::AuditResult;
use warden_core::ChainVerification;
use warden_core::FailureCategory;
use warden_core::NewApprovalRequest;
use warden_core::NewAuditRecord;
use warden_core::ParameterMap;
use warden_core::Policy;
use warden_core::PolicyName;
use warden_core::PolicyRule;
use warden_core::PolicyVersion;
use warden_core::TenantId;
use warden_core::Timestamp;
use warden_core::TraceId;
use warden_core::hashing;
use warden_core::interfaces::ApprovalFilter;
use warden_core::interfaces::ApprovalStore;
use warden_core::interfaces::AuditPage;
use warden_core::interfaces::AuditQuery;
use warden_core::interfaces::GovernanceStore;
use warden_core::interfaces::PolicyUpsert;
use warden_core::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current `SQLite` schema version.
pub const SCHEMA_VERSION: u32 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Versioned schema migrations applied in order.
const MIGRATIONS: &[(u32, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trace_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        ts_unix_ms INTEGER NOT NULL,
        agent_id TEXT NOT NULL,
        tool TEXT NOT NULL,
        parameters TEXT,
        result TEXT NOT NULL
            CHECK (result IN ('allowed', 'denied', 'error', 'retention-boundary')),
        reason TEXT,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        failure_category TEXT,
        previous_hash TEXT,
        hash TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_audit_log_agent ON audit_log (agent_id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_trace ON audit_log (trace_id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_time ON audit_log (ts_unix_ms);
    CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_update
    BEFORE UPDATE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit_log is append-only');
    END;
    CREATE TRIGGER IF NOT EXISTS trg_audit_log_no_delete
    BEFORE DELETE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit_log is append-only');
    END;
    CREATE TABLE IF NOT EXISTS policies (
        name TEXT PRIMARY KEY,
        version INTEGER NOT NULL,
        agent_id TEXT,
        rules TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS policy_versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        policy_name TEXT NOT NULL,
        version INTEGER NOT NULL,
        agent_id TEXT,
        rules TEXT NOT NULL,
        author TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_policy_versions_name
        ON policy_versions (policy_name);
    CREATE TABLE IF NOT EXISTS agents (
        agent_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        allowed_tools TEXT NOT NULL,
        policy_name TEXT,
        metadata TEXT,
        status TEXT NOT NULL
            CHECK (status IN ('registered', 'running', 'stopped', 'error')),
        registered_at TEXT NOT NULL,
        last_active_at TEXT
    );
    CREATE TABLE IF NOT EXISTS approvals (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tenant_id TEXT,
        agent_id TEXT NOT NULL,
        tool TEXT NOT NULL,
        parameters TEXT,
        trace_id TEXT NOT NULL,
        policy_name TEXT NOT NULL,
        rule_name TEXT,
        status TEXT NOT NULL
            CHECK (status IN ('pending', 'approved', 'rejected', 'timeout')),
        deadline TEXT NOT NULL,
        approver TEXT,
        comment TEXT,
        created_at TEXT NOT NULL,
        resolved_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_approvals_status ON approvals (status);",
)];

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` governance store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` governance store errors.
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
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Shared connection state behind scoped handles.
struct StoreInner {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Mutex<Connection>,
}

/// `SQLite`-backed governance store with WAL support.
#[derive(Clone)]
pub struct SqliteGovernanceStore {
    /// Shared connection state.
    inner: Arc<StoreInner>,
    /// Tenant scope applied to approval rows.
    tenant: Option<TenantId>,
}

impl SqliteGovernanceStore {
    /// Opens an `SQLite`-backed governance store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// its schema is newer than this build, or migration fails.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = Connection::open(&config.path)?;
        apply_pragmas(&connection, config)?;
        let store = Self {
            inner: Arc::new(StoreInner {
                connection: Mutex::new(connection),
            }),
            tenant: None,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Opens a store backed by process memory, for tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory()?;
        let store = Self {
            inner: Arc::new(StoreInner {
                connection: Mutex::new(connection),
            }),
            tenant: None,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.inner
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Runs a unit of work inside one transaction, rolling back on error.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the transaction fails or the body
    /// returns an error.
    pub fn with_transaction<T>(
        &self,
        body: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Applies pending schema migrations; returns the number applied.
    fn migrate(&self) -> Result<u32, SqliteStoreError> {
        self.with_transaction(|tx| {
            tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
            let current: Option<i64> = tx
                .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
                .optional()?;
            let current = current.unwrap_or(0);
            let latest = i64::from(MIGRATIONS.last().map_or(0, |(version, _)| *version));
            if current > latest {
                return Err(SqliteStoreError::VersionMismatch(format!(
                    "database schema version {current} is newer than supported {latest}"
                )));
            }
            let mut applied = 0u32;
            for (version, sql) in MIGRATIONS {
                if i64::from(*version) <= current {
                    continue;
                }
                tx.execute_batch(sql)?;
                applied += 1;
            }
            if applied > 0 || current == 0 {
                tx.execute("DELETE FROM store_meta", params![])?;
                tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![latest])?;
            }
            Ok(applied)
        })
    }
}

// ============================================================================
// SECTION: Governance Store Implementation
// ============================================================================

impl GovernanceStore for SqliteGovernanceStore {
    fn write_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        let ts_unix_ms = unix_millis(&record.timestamp)?;
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(map_db)?;
        let previous_hash: Option<String> = tx
            .query_row("SELECT hash FROM audit_log ORDER BY id DESC LIMIT 1", params![], |row| {
                row.get(0)
            })
            .optional()
            .map_err(map_db)?;
        let hash = hashing::compute_hash(&(&record).into(), previous_hash.as_deref())
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let parameters_json = parameters_to_json(record.parameters.as_ref())?;
        tx.execute(
            "INSERT INTO audit_log (trace_id, timestamp, ts_unix_ms, agent_id, tool, parameters,
                result, reason, duration_ms, failure_category, previous_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.trace_id.as_str(),
                record.timestamp,
                ts_unix_ms,
                record.agent_id.as_str(),
                record.tool,
                parameters_json,
                record.result.as_str(),
                record.reason,
                i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
                record.failure_category.map(FailureCategory::as_str),
                previous_hash,
                hash,
            ],
        )
        .map_err(map_db)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(map_db)?;
        Ok(record.into_record(id, previous_hash, hash))
    }

    fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let (where_clause, values) = build_audit_filter(query)?;
        let guard = self.lock().map_err(StoreError::from)?;

        let count_sql = format!("SELECT COUNT(*) FROM audit_log{where_clause}");
        let total: i64 = guard
            .query_row(&count_sql, rusqlite::params_from_iter(values.iter()), |row| row.get(0))
            .map_err(map_db)?;

        let mut select_sql = format!(
            "SELECT id, trace_id, timestamp, agent_id, tool, parameters, result, reason,
                duration_ms, failure_category, previous_hash, hash
             FROM audit_log{where_clause} ORDER BY id ASC"
        );
        let mut page_values = values;
        if let Some(limit) = query.limit {
            select_sql.push_str(" LIMIT ?");
            page_values.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
            if let Some(offset) = query.offset {
                select_sql.push_str(" OFFSET ?");
                page_values.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
            }
        } else if let Some(offset) = query.offset {
            select_sql.push_str(" LIMIT -1 OFFSET ?");
            page_values.push(SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
        }

        let mut statement = guard.prepare(&select_sql).map_err(map_db)?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(page_values.iter()), audit_row)
            .map_err(map_db)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(parse_audit_row(row.map_err(map_db)?)?);
        }
        Ok(AuditPage {
            records,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    fn latest_audit_hash(&self) -> Result<Option<String>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .query_row("SELECT hash FROM audit_log ORDER BY id DESC LIMIT 1", params![], |row| {
                row.get(0)
            })
            .optional()
            .map_err(map_db)
    }

    fn verify_audit_chain(&self) -> Result<ChainVerification, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT id, trace_id, timestamp, agent_id, tool, parameters, result, reason,
                    duration_ms, failure_category, previous_hash, hash
                 FROM audit_log ORDER BY id ASC",
            )
            .map_err(map_db)?;
        let rows = statement.query_map(params![], audit_row).map_err(map_db)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(parse_audit_row(row.map_err(map_db)?)?);
        }
        Ok(hashing::verify_chain(&records))
    }

    fn export_audit(&self, query: &AuditQuery, out: &mut dyn Write) -> Result<u64, StoreError> {
        let page = self.query_audit(query)?;
        let mut written = 0u64;
        for record in &page.records {
            let line = serde_json::to_string(record)
                .map_err(|err| StoreError::Serialization(err.to_string()))?;
            writeln!(out, "{line}").map_err(|err| StoreError::Io(err.to_string()))?;
            written += 1;
        }
        Ok(written)
    }

    fn upsert_policy(&self, policy: &Policy, author: &str) -> Result<PolicyUpsert, StoreError> {
        let rules_json = serde_json::to_string(&policy.rules)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let now = Timestamp::now().to_rfc3339();
        self.with_transaction(|tx| {
            let existing: Option<(i64, Option<String>, String)> = tx
                .query_row(
                    "SELECT version, agent_id, rules FROM policies WHERE name = ?1",
                    params![policy.name.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            match existing {
                Some((prior_version, prior_agent, prior_rules)) => {
                    tx.execute(
                        "INSERT INTO policy_versions
                            (policy_name, version, agent_id, rules, author, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            policy.name.as_str(),
                            prior_version,
                            prior_agent,
                            prior_rules,
                            author,
                            now,
                        ],
                    )?;
                    let version = u32::try_from(prior_version).unwrap_or(0) + 1;
                    tx.execute(
                        "UPDATE policies
                         SET version = ?2, agent_id = ?3, rules = ?4, updated_at = ?5
                         WHERE name = ?1",
                        params![
                            policy.name.as_str(),
                            i64::from(version),
                            policy.agent_id.as_ref().map(AgentId::as_str),
                            rules_json,
                            now,
                        ],
                    )?;
                    Ok(PolicyUpsert {
                        created: false,
                        version,
                    })
                }
                None => {
                    let version = policy.version.max(1);
                    tx.execute(
                        "INSERT INTO policies
                            (name, version, agent_id, rules, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            policy.name.as_str(),
                            i64::from(version),
                            policy.agent_id.as_ref().map(AgentId::as_str),
                            rules_json,
                            policy.created_at.to_rfc3339(),
                            now,
                        ],
                    )?;
                    Ok(PolicyUpsert {
                        created: true,
                        version,
                    })
                }
            }
        })
        .map_err(StoreError::from)
    }

    fn get_policy(&self, name: &PolicyName) -> Result<Option<Policy>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row = guard
            .query_row(
                "SELECT name, version, agent_id, rules, created_at, updated_at
                 FROM policies WHERE name = ?1",
                params![name.as_str()],
                policy_row,
            )
            .optional()
            .map_err(map_db)?;
        row.map(parse_policy_row).transpose()
    }

    fn list_policies(&self) -> Result<Vec<Policy>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT name, version, agent_id, rules, created_at, updated_at
                 FROM policies ORDER BY name ASC",
            )
            .map_err(map_db)?;
        let rows = statement.query_map(params![], policy_row).map_err(map_db)?;
        let mut policies = Vec::new();
        for row in rows {
            policies.push(parse_policy_row(row.map_err(map_db)?)?);
        }
        Ok(policies)
    }

    fn delete_policy(&self, name: &PolicyName) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let deleted = guard
            .execute("DELETE FROM policies WHERE name = ?1", params![name.as_str()])
            .map_err(map_db)?;
        Ok(deleted > 0)
    }

    fn resolve_active_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError> {
        let scoped = self.load_policies_where("agent_id = ?1", params![agent_id.as_str()])?;
        if let Some(policy) = newest_policy(scoped) {
            return Ok(Some(policy));
        }
        let global = self.load_policies_where("agent_id IS NULL", params![])?;
        Ok(newest_policy(global))
    }

    fn policy_history(&self, name: &PolicyName) -> Result<Vec<PolicyVersion>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT id, policy_name, version, agent_id, rules, author, created_at
                 FROM policy_versions WHERE policy_name = ?1 ORDER BY id DESC",
            )
            .map_err(map_db)?;
        let rows = statement.query_map(params![name.as_str()], version_row).map_err(map_db)?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(parse_version_row(row.map_err(map_db)?)?);
        }
        Ok(versions)
    }

    fn policy_version(&self, id: i64) -> Result<Option<PolicyVersion>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row = guard
            .query_row(
                "SELECT id, policy_name, version, agent_id, rules, author, created_at
                 FROM policy_versions WHERE id = ?1",
                params![id],
                version_row,
            )
            .optional()
            .map_err(map_db)?;
        row.map(parse_version_row).transpose()
    }

    fn register_agent(&self, config: &AgentConfig) -> Result<(), StoreError> {
        let allowed_tools = serde_json::to_string(&config.allowed_tools)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        let metadata = parameters_to_json(config.metadata.as_ref())?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO agents
                    (agent_id, name, description, allowed_tools, policy_name, metadata, status,
                     registered_at, last_active_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (agent_id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    allowed_tools = excluded.allowed_tools,
                    policy_name = excluded.policy_name,
                    metadata = excluded.metadata,
                    status = excluded.status",
                params![
                    config.agent_id.as_str(),
                    config.name,
                    config.description,
                    allowed_tools,
                    config.policy_name.as_ref().map(PolicyName::as_str),
                    metadata,
                    config.status.as_str(),
                    config.registered_at.to_rfc3339(),
                    config.last_active_at.map(|at| at.to_rfc3339()),
                ],
            )
            .map_err(map_db)?;
        Ok(())
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row = guard
            .query_row(
                "SELECT agent_id, name, description, allowed_tools, policy_name, metadata,
                    status, registered_at, last_active_at
                 FROM agents WHERE agent_id = ?1",
                params![agent_id.as_str()],
                agent_row,
            )
            .optional()
            .map_err(map_db)?;
        row.map(parse_agent_row).transpose()
    }

    fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let updated = guard
            .execute(
                "UPDATE agents SET status = ?2, last_active_at = ?3 WHERE agent_id = ?1",
                params![agent_id.as_str(), status.as_str(), at.to_rfc3339()],
            )
            .map_err(map_db)?;
        Ok(updated > 0)
    }

    fn list_agents(&self) -> Result<Vec<AgentConfig>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard
            .prepare(
                "SELECT agent_id, name, description, allowed_tools, policy_name, metadata,
                    status, registered_at, last_active_at
                 FROM agents ORDER BY agent_id ASC",
            )
            .map_err(map_db)?;
        let rows = statement.query_map(params![], agent_row).map_err(map_db)?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(parse_agent_row(row.map_err(map_db)?)?);
        }
        Ok(agents)
    }

    fn delete_agent(&self, agent_id: &AgentId) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let deleted = guard
            .execute("DELETE FROM agents WHERE agent_id = ?1", params![agent_id.as_str()])
            .map_err(map_db)?;
        Ok(deleted > 0)
    }

    fn approvals(&self) -> Option<&dyn ApprovalStore> {
        Some(self)
    }

    fn for_tenant(&self, tenant_id: &TenantId) -> Option<Arc<dyn GovernanceStore>> {
        Some(Arc::new(Self {
            inner: Arc::clone(&self.inner),
            tenant: Some(tenant_id.clone()),
        }))
    }

    fn apply_migrations(&self) -> Result<u32, StoreError> {
        self.migrate().map_err(StoreError::from)
    }

    fn schema_version(&self) -> Result<u32, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let version: Option<i64> = guard
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
            .optional()
            .map_err(map_db)?;
        Ok(version.and_then(|value| u32::try_from(value).ok()).unwrap_or(0))
    }
}

impl SqliteGovernanceStore {
    /// Loads policies matching a WHERE fragment.
    fn load_policies_where(
        &self,
        clause: &str,
        parameters: impl rusqlite::Params,
    ) -> Result<Vec<Policy>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let sql = format!(
            "SELECT name, version, agent_id, rules, created_at, updated_at
             FROM policies WHERE {clause}"
        );
        let mut statement = guard.prepare(&sql).map_err(map_db)?;
        let rows = statement.query_map(parameters, policy_row).map_err(map_db)?;
        let mut policies = Vec::new();
        for row in rows {
            policies.push(parse_policy_row(row.map_err(map_db)?)?);
        }
        Ok(policies)
    }
}

// ============================================================================
// SECTION: Approval Store Implementation
// ============================================================================

impl ApprovalStore for SqliteGovernanceStore {
    fn create_approval(&self, request: NewApprovalRequest) -> Result<ApprovalRequest, StoreError> {
        let tenant = self.tenant.clone().or(request.tenant_id.clone());
        let parameters_json = parameters_to_json(request.parameters.as_ref())?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO approvals
                    (tenant_id, agent_id, tool, parameters, trace_id, policy_name, rule_name,
                     status, deadline, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9)",
                params![
                    tenant.as_ref().map(TenantId::as_str),
                    request.agent_id.as_str(),
                    request.tool,
                    parameters_json,
                    request.trace_id.as_str(),
                    request.policy_name.as_str(),
                    request.rule_name,
                    request.deadline.to_rfc3339(),
                    request.created_at.to_rfc3339(),
                ],
            )
            .map_err(map_db)?;
        let id = guard.last_insert_rowid();
        Ok(ApprovalRequest {
            id,
            tenant_id: tenant,
            agent_id: request.agent_id,
            tool: request.tool,
            parameters: request.parameters,
            trace_id: request.trace_id,
            policy_name: request.policy_name,
            rule_name: request.rule_name,
            status: ApprovalStatus::Pending,
            deadline: request.deadline,
            approver: None,
            comment: None,
            created_at: request.created_at,
            resolved_at: None,
        })
    }

    fn get_approval(&self, id: i64) -> Result<Option<ApprovalRequest>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let row = guard
            .query_row(
                "SELECT id, tenant_id, agent_id, tool, parameters, trace_id, policy_name,
                    rule_name, status, deadline, approver, comment, created_at, resolved_at
                 FROM approvals WHERE id = ?1",
                params![id],
                approval_row,
            )
            .optional()
            .map_err(map_db)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let approval = parse_approval_row(row)?;
        if self.tenant.as_ref().is_some_and(|tenant| approval.tenant_id.as_ref() != Some(tenant)) {
            return Ok(None);
        }
        Ok(Some(approval))
    }

    fn list_approvals(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(agent_id) = &filter.agent_id {
            clauses.push("agent_id = ?");
            values.push(SqlValue::Text(agent_id.as_str().to_string()));
        }
        if let Some(tenant) = &self.tenant {
            clauses.push("tenant_id = ?");
            values.push(SqlValue::Text(tenant.as_str().to_string()));
        }
        let where_clause =
            if clauses.is_empty() { String::new() } else { format!(" WHERE {}", clauses.join(" AND ")) };
        let sql = format!(
            "SELECT id, tenant_id, agent_id, tool, parameters, trace_id, policy_name, rule_name,
                status, deadline, approver, comment, created_at, resolved_at
             FROM approvals{where_clause} ORDER BY id ASC"
        );
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard.prepare(&sql).map_err(map_db)?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(values.iter()), approval_row)
            .map_err(map_db)?;
        let mut approvals = Vec::new();
        for row in rows {
            approvals.push(parse_approval_row(row.map_err(map_db)?)?);
        }
        Ok(approvals)
    }

    fn resolve_approval(
        &self,
        id: i64,
        resolution: &ApprovalResolution,
        now: Timestamp,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(map_db)?;
        let row = tx
            .query_row(
                "SELECT id, tenant_id, agent_id, tool, parameters, trace_id, policy_name,
                    rule_name, status, deadline, approver, comment, created_at, resolved_at
                 FROM approvals WHERE id = ?1",
                params![id],
                approval_row,
            )
            .optional()
            .map_err(map_db)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let approval = parse_approval_row(row)?;
        if self.tenant.as_ref().is_some_and(|tenant| approval.tenant_id.as_ref() != Some(tenant)) {
            return Ok(None);
        }
        let within_deadline =
            resolution.decision == ApprovalDecision::Timeout || approval.deadline >= now;
        if approval.status != ApprovalStatus::Pending || !within_deadline {
            return Ok(None);
        }
        // The status predicate keeps the transition conditional even when
        // another writer resolved the row between the read and this update.
        let updated = tx
            .execute(
                "UPDATE approvals
                 SET status = ?2, approver = ?3, comment = ?4, resolved_at = ?5
                 WHERE id = ?1 AND status = 'pending'",
                params![
                    id,
                    resolution.decision.as_str(),
                    resolution.approver,
                    resolution.comment,
                    now.to_rfc3339(),
                ],
            )
            .map_err(map_db)?;
        if updated == 0 {
            return Ok(None);
        }
        tx.commit().map_err(map_db)?;
        Ok(Some(ApprovalRequest {
            status: resolution.decision.status(),
            approver: resolution.approver.clone(),
            comment: resolution.comment.clone(),
            resolved_at: Some(now),
            ..approval
        }))
    }
}

// ============================================================================
// SECTION: Query Building
// ============================================================================

/// Builds the WHERE clause and parameter list for an audit query.
fn build_audit_filter(query: &AuditQuery) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(agent_id) = &query.agent_id {
        clauses.push("agent_id = ?".to_string());
        values.push(SqlValue::Text(agent_id.as_str().to_string()));
    }
    if let Some(tool) = &query.tool {
        clauses.push("tool = ?".to_string());
        values.push(SqlValue::Text(tool.clone()));
    }
    if let Some(result) = query.result {
        clauses.push("result = ?".to_string());
        values.push(SqlValue::Text(result.as_str().to_string()));
    }
    if let Some(trace_id) = &query.trace_id {
        clauses.push("trace_id = ?".to_string());
        values.push(SqlValue::Text(trace_id.as_str().to_string()));
    }
    if let Some(category) = query.failure_category {
        clauses.push("failure_category = ?".to_string());
        values.push(SqlValue::Text(category.as_str().to_string()));
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(search));
        clauses.push(
            "(reason LIKE ? ESCAPE '\\' OR parameters LIKE ? ESCAPE '\\')".to_string(),
        );
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }
    if let Some(since) = query.since {
        clauses.push("ts_unix_ms >= ?".to_string());
        values.push(SqlValue::Integer(timestamp_millis(since)));
    }
    if let Some(until) = query.until {
        clauses.push("ts_unix_ms <= ?".to_string());
        values.push(SqlValue::Integer(timestamp_millis(until)));
    }
    let where_clause =
        if clauses.is_empty() { String::new() } else { format!(" WHERE {}", clauses.join(" AND ")) };
    Ok((where_clause, values))
}

/// Escapes LIKE metacharacters so user input is treated literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Raw audit row tuple read from `SQLite`.
type AuditRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    i64,
    Option<String>,
    Option<String>,
    String,
);

/// Reads an audit row into its raw tuple form.
fn audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

/// Converts a raw audit row into an [`AuditRecord`].
fn parse_audit_row(row: AuditRow) -> Result<AuditRecord, StoreError> {
    let (
        id,
        trace_id,
        timestamp,
        agent_id,
        tool,
        parameters,
        result,
        reason,
        duration_ms,
        category,
        previous_hash,
        hash,
    ) = row;
    let trace_id = TraceId::parse(&trace_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid trace id on audit record {id}")))?;
    let result = AuditResult::parse(&result)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid result on audit record {id}")))?;
    Ok(AuditRecord {
        id,
        trace_id,
        timestamp,
        agent_id: AgentId::new(agent_id),
        tool,
        parameters: parameters.as_deref().and_then(json_to_parameters),
        result,
        reason,
        duration_ms: u64::try_from(duration_ms).unwrap_or(0),
        failure_category: category.as_deref().and_then(FailureCategory::parse),
        previous_hash,
        hash,
    })
}

/// Raw policy row tuple read from `SQLite`.
type PolicyRow = (String, i64, Option<String>, String, String, String);

/// Reads a policy row into its raw tuple form.
fn policy_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PolicyRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

/// Converts a raw policy row into a [`Policy`].
fn parse_policy_row(row: PolicyRow) -> Result<Policy, StoreError> {
    let (name, version, agent_id, rules, created_at, updated_at) = row;
    let rules: Vec<PolicyRule> =
        serde_json::from_str(&rules).map_err(|err| StoreError::Serialization(err.to_string()))?;
    Ok(Policy {
        name: PolicyName::new(name),
        version: u32::try_from(version).unwrap_or(0),
        agent_id: agent_id.map(AgentId::new),
        rules,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Raw policy version row tuple read from `SQLite`.
type VersionRow = (i64, String, i64, Option<String>, String, String, String);

/// Reads a policy version row into its raw tuple form.
fn version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

/// Converts a raw version row into a [`PolicyVersion`].
fn parse_version_row(row: VersionRow) -> Result<PolicyVersion, StoreError> {
    let (id, policy_name, version, agent_id, rules, author, created_at) = row;
    let rules: Vec<PolicyRule> =
        serde_json::from_str(&rules).map_err(|err| StoreError::Serialization(err.to_string()))?;
    Ok(PolicyVersion {
        id,
        policy_name: PolicyName::new(policy_name),
        version: u32::try_from(version).unwrap_or(0),
        agent_id: agent_id.map(AgentId::new),
        rules,
        author,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Raw agent row tuple read from `SQLite`.
type AgentRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
);

/// Reads an agent row into its raw tuple form.
fn agent_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

/// Converts a raw agent row into an [`AgentConfig`].
fn parse_agent_row(row: AgentRow) -> Result<AgentConfig, StoreError> {
    let (
        agent_id,
        name,
        description,
        allowed_tools,
        policy_name,
        metadata,
        status,
        registered_at,
        last_active_at,
    ) = row;
    let allowed_tools: Vec<String> = serde_json::from_str(&allowed_tools)
        .map_err(|err| StoreError::Serialization(err.to_string()))?;
    Ok(AgentConfig {
        agent_id: AgentId::new(agent_id),
        name,
        description,
        allowed_tools,
        policy_name: policy_name.map(PolicyName::new),
        metadata: metadata.as_deref().and_then(json_to_parameters),
        status: AgentStatus::parse(&status).unwrap_or(AgentStatus::Error),
        registered_at: parse_timestamp(&registered_at)?,
        last_active_at: last_active_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

/// Raw approval row tuple read from `SQLite`.
type ApprovalRow = (
    i64,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
);

/// Reads an approval row into its raw tuple form.
fn approval_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

/// Converts a raw approval row into an [`ApprovalRequest`].
fn parse_approval_row(row: ApprovalRow) -> Result<ApprovalRequest, StoreError> {
    let (
        id,
        tenant_id,
        agent_id,
        tool,
        parameters,
        trace_id,
        policy_name,
        rule_name,
        status,
        deadline,
        approver,
        comment,
        created_at,
        resolved_at,
    ) = row;
    let trace_id = TraceId::parse(&trace_id)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid trace id on approval {id}")))?;
    Ok(ApprovalRequest {
        id,
        tenant_id: tenant_id.map(TenantId::new),
        agent_id: AgentId::new(agent_id),
        tool,
        parameters: parameters.as_deref().and_then(json_to_parameters),
        trace_id,
        policy_name: PolicyName::new(policy_name),
        rule_name,
        status: ApprovalStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("invalid status on approval {id}")))?,
        deadline: parse_timestamp(&deadline)?,
        approver,
        comment,
        created_at: parse_timestamp(&created_at)?,
        resolved_at: resolved_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

// ============================================================================
// SECTION: Serialization Helpers
// ============================================================================

/// Serializes a parameter map to JSON text.
fn parameters_to_json(parameters: Option<&ParameterMap>) -> Result<Option<String>, StoreError> {
    parameters
        .map(|map| {
            serde_json::to_string(map).map_err(|err| StoreError::Serialization(err.to_string()))
        })
        .transpose()
}

/// Parses JSON text into a parameter map, discarding non-object payloads.
fn json_to_parameters(json: &str) -> Option<ParameterMap> {
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parses a stored RFC 3339 timestamp.
fn parse_timestamp(value: &str) -> Result<Timestamp, StoreError> {
    Timestamp::parse_rfc3339(value)
        .map_err(|err| StoreError::Corrupt(format!("invalid stored timestamp: {err}")))
}

/// Parses a record timestamp into unix milliseconds for range filtering.
fn unix_millis(timestamp: &str) -> Result<i64, StoreError> {
    let parsed = Timestamp::parse_rfc3339(timestamp)
        .map_err(|err| StoreError::Invalid(format!("invalid record timestamp: {err}")))?;
    Ok(timestamp_millis(parsed))
}

/// Converts a timestamp to unix milliseconds.
fn timestamp_millis(timestamp: Timestamp) -> i64 {
    let nanos = timestamp.as_datetime().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// Picks the most recently updated policy from candidates.
fn newest_policy(candidates: Vec<Policy>) -> Option<Policy> {
    candidates.into_iter().max_by_key(|policy| policy.updated_at)
}

/// Maps a `rusqlite` error into a [`StoreError`].
fn map_db(error: rusqlite::Error) -> StoreError {
    StoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

/// Validates the store path before opening the database.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let rendered = path.to_string_lossy();
    if rendered.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path too long".to_string()));
    }
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                return Err(SqliteStoreError::Invalid(
                    "store path must not contain traversal components".to_string(),
                ));
            }
            std::path::Component::Normal(part) => {
                if part.to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
                    return Err(SqliteStoreError::Invalid(
                        "store path component too long".to_string(),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Creates the parent directory for the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(SqliteStoreError::from)?;
    Ok(())
}
