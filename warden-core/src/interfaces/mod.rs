// warden-core/src/interfaces/mod.rs
// ============================================================================
// Module: Persistence Contract
// Description: Backend-agnostic store interfaces for governance state.
// Purpose: Define the typed operations the orchestrator depends on.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The persistence contract covers audit, policy, policy history, agents,
//! and approvals. Implementations are polymorphic over the capability set:
//! approval support is surfaced through [`GovernanceStore::approvals`] and
//! tenant scoping through [`GovernanceStore::for_tenant`], both of which
//! default to `None`. The orchestrator detects missing capabilities at call
//! time and fails secure. At this boundary, parameter and rule payloads are
//! serialized as JSON text and timestamps as RFC 3339 strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::AgentConfig;
use crate::core::AgentId;
use crate::core::AgentStatus;
use crate::core::ApprovalRequest;
use crate::core::ApprovalResolution;
use crate::core::ApprovalStatus;
use crate::core::AuditRecord;
use crate::core::AuditResult;
use crate::core::ChainVerification;
use crate::core::FailureCategory;
use crate::core::GovernanceError;
use crate::core::NewApprovalRequest;
use crate::core::NewAuditRecord;
use crate::core::Policy;
use crate::core::PolicyName;
use crate::core::PolicyVersion;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Governance store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("governance store io error: {0}")]
    Io(String),
    /// Underlying database error.
    #[error("governance store db error: {0}")]
    Db(String),
    /// Stored data failed to serialize or deserialize.
    #[error("governance store serialization error: {0}")]
    Serialization(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("governance store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is incompatible.
    #[error("governance store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("governance store invalid data: {0}")]
    Invalid(String),
    /// The store does not implement the requested operation.
    #[error("governance store unsupported operation: {0}")]
    Unsupported(String),
}

impl From<StoreError> for GovernanceError {
    fn from(error: StoreError) -> Self {
        Self::store_failure(error.to_string())
    }
}

// ============================================================================
// SECTION: Query Types
// ============================================================================

/// Filter and pagination for audit queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    /// Restrict to one agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Restrict to one tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Restrict to one result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AuditResult>,
    /// Restrict to one trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// Restrict to one failure category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,
    /// Free-text search over reason and parameters; always treated literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Inclusive lower bound on record time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
    /// Inclusive upper bound on record time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
    /// Maximum records returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Records skipped before the first returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// One page of audit records plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    /// Records in ascending id order.
    pub records: Vec<AuditRecord>,
    /// Total matching records before pagination.
    pub total: u64,
}

/// Filter for approval listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalFilter {
    /// Restrict to one status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
    /// Restrict to one agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

/// Result of a policy upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUpsert {
    /// True when the upsert created a new policy row.
    pub created: bool,
    /// Version the stored policy carries after the write.
    pub version: u32,
}

// ============================================================================
// SECTION: Approval Store
// ============================================================================

/// Approval operations; a store exposing all four is approval-capable.
pub trait ApprovalStore: Send + Sync {
    /// Persists a pending approval request and assigns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn create_approval(&self, request: NewApprovalRequest) -> Result<ApprovalRequest, StoreError>;

    /// Loads an approval request by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_approval(&self, id: i64) -> Result<Option<ApprovalRequest>, StoreError>;

    /// Lists approval requests matching the filter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_approvals(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, StoreError>;

    /// Applies an optimistic conditional resolution.
    ///
    /// The transition succeeds only while the record is still pending and,
    /// unless the resolution is a timeout, its deadline has not passed.
    /// A contention loser observes `Ok(None)` and takes no further action.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn resolve_approval(
        &self,
        id: i64,
        resolution: &ApprovalResolution,
        now: Timestamp,
    ) -> Result<Option<ApprovalRequest>, StoreError>;
}

// ============================================================================
// SECTION: Governance Store
// ============================================================================

/// Typed persistence contract for governance state.
pub trait GovernanceStore: Send + Sync {
    /// Appends an audit record, assigning its id and chain hashes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn write_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError>;

    /// Queries audit records with filters and pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError>;

    /// Returns the hash of the most recent audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn latest_audit_hash(&self) -> Result<Option<String>, StoreError>;

    /// Walks the full chain and reports the first break.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn verify_audit_chain(&self) -> Result<ChainVerification, StoreError>;

    /// Streams matching records as newline-delimited JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read or write fails.
    fn export_audit(&self, query: &AuditQuery, out: &mut dyn Write) -> Result<u64, StoreError>;

    /// Upserts a policy, snapshotting any prior row into policy history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_policy(&self, policy: &Policy, author: &str) -> Result<PolicyUpsert, StoreError>;

    /// Loads a policy by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_policy(&self, name: &PolicyName) -> Result<Option<Policy>, StoreError>;

    /// Lists all stored policies.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_policies(&self) -> Result<Vec<Policy>, StoreError>;

    /// Deletes a policy by name; returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn delete_policy(&self, name: &PolicyName) -> Result<bool, StoreError>;

    /// Resolves the active policy for an agent.
    ///
    /// Agent-specific policies win over global ones; ties break by
    /// `updated_at` descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn resolve_active_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError>;

    /// Lists history snapshots for a policy, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn policy_history(&self, name: &PolicyName) -> Result<Vec<PolicyVersion>, StoreError>;

    /// Loads one history snapshot by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn policy_version(&self, id: i64) -> Result<Option<PolicyVersion>, StoreError>;

    /// Registers or overwrites an agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn register_agent(&self, config: &AgentConfig) -> Result<(), StoreError>;

    /// Loads an agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>, StoreError>;

    /// Writes an agent status; returns false when the agent is absent.
    ///
    /// `last_active_at` advances to `at` only on this path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Lists all registered agents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_agents(&self) -> Result<Vec<AgentConfig>, StoreError>;

    /// Deletes an agent; returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn delete_agent(&self, agent_id: &AgentId) -> Result<bool, StoreError>;

    /// Returns the approval operations when this store supports them.
    fn approvals(&self) -> Option<&dyn ApprovalStore> {
        None
    }

    /// Returns a tenant-scoped handle when this store supports scoping.
    fn for_tenant(&self, tenant_id: &TenantId) -> Option<Arc<dyn GovernanceStore>> {
        let _ = tenant_id;
        None
    }

    /// Applies pending schema migrations; returns the number applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when migration fails.
    fn apply_migrations(&self) -> Result<u32, StoreError>;

    /// Returns the current schema version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn schema_version(&self) -> Result<u32, StoreError>;
}
