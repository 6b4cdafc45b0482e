// warden-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Governance Store
// Description: Full persistence contract backed by process memory.
// Purpose: Serve tests, demos, and the zero-configuration path.
// Dependencies: serde_json, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! A complete [`GovernanceStore`] and [`ApprovalStore`] implementation over
//! a shared mutex-guarded state map. The audit chain is maintained with the
//! same hashing primitive as durable stores, so chain verification behaves
//! identically. Tenant-scoped handles share the underlying state and stamp
//! the tenant onto approval rows. Not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AgentConfig;
use crate::core::AgentId;
use crate::core::AgentStatus;
use crate::core::ApprovalDecision;
use crate::core::ApprovalRequest;
use crate::core::ApprovalResolution;
use crate::core::ApprovalStatus;
use crate::core::AuditRecord;
use crate::core::ChainVerification;
use crate::core::NewApprovalRequest;
use crate::core::NewAuditRecord;
use crate::core::Policy;
use crate::core::PolicyName;
use crate::core::PolicyVersion;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::hashing;
use crate::interfaces::ApprovalFilter;
use crate::interfaces::ApprovalStore;
use crate::interfaces::AuditPage;
use crate::interfaces::AuditQuery;
use crate::interfaces::GovernanceStore;
use crate::interfaces::PolicyUpsert;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version reported by the in-memory store.
const MEMORY_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// SECTION: State
// ============================================================================

/// Mutable store state behind the lock.
#[derive(Debug, Default)]
struct MemoryState {
    /// Audit records in chain order.
    audit: Vec<AuditRecord>,
    /// Next audit record identifier.
    next_audit_id: i64,
    /// Policies keyed by name.
    policies: BTreeMap<String, Policy>,
    /// Policy history snapshots in creation order.
    versions: Vec<PolicyVersion>,
    /// Next policy version identifier.
    next_version_id: i64,
    /// Agents keyed by identifier.
    agents: BTreeMap<String, AgentConfig>,
    /// Approval requests in creation order.
    approvals: Vec<ApprovalRequest>,
    /// Next approval identifier.
    next_approval_id: i64,
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory governance store for tests and examples.
#[derive(Clone, Default)]
pub struct InMemoryGovernanceStore {
    /// Shared state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
    /// Tenant scope stamped onto approval rows.
    tenant: Option<TenantId>,
}

impl InMemoryGovernanceStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the shared state, mapping a poisoned mutex to a store error.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Db("governance store mutex poisoned".to_string()))
    }
}

/// Returns true when a record matches the audit query filters.
fn matches_query(record: &AuditRecord, query: &AuditQuery) -> bool {
    if let Some(agent_id) = &query.agent_id
        && &record.agent_id != agent_id
    {
        return false;
    }
    if let Some(tool) = &query.tool
        && &record.tool != tool
    {
        return false;
    }
    if let Some(result) = query.result
        && record.result != result
    {
        return false;
    }
    if let Some(trace_id) = &query.trace_id
        && &record.trace_id != trace_id
    {
        return false;
    }
    if let Some(category) = query.failure_category
        && record.failure_category != Some(category)
    {
        return false;
    }
    if let Some(search) = &query.search {
        let in_reason = record.reason.as_deref().is_some_and(|reason| reason.contains(search));
        let in_parameters = record
            .parameters
            .as_ref()
            .and_then(|parameters| serde_json::to_string(parameters).ok())
            .is_some_and(|serialized| serialized.contains(search));
        if !in_reason && !in_parameters {
            return false;
        }
    }
    if query.since.is_some() || query.until.is_some() {
        let Ok(at) = Timestamp::parse_rfc3339(&record.timestamp) else {
            return false;
        };
        if query.since.is_some_and(|since| at < since) {
            return false;
        }
        if query.until.is_some_and(|until| at > until) {
            return false;
        }
    }
    true
}

/// Applies offset and limit to a filtered record list.
fn paginate(records: Vec<AuditRecord>, query: &AuditQuery) -> Vec<AuditRecord> {
    let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = query.limit.and_then(|limit| usize::try_from(limit).ok());
    let iter = records.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

impl GovernanceStore for InMemoryGovernanceStore {
    fn write_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, StoreError> {
        let mut state = self.lock()?;
        let previous_hash = state.audit.last().map(|last| last.hash.clone());
        let hash = hashing::compute_hash(&(&record).into(), previous_hash.as_deref())
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        state.next_audit_id += 1;
        let id = state.next_audit_id;
        let stored = record.into_record(id, previous_hash, hash);
        state.audit.push(stored.clone());
        Ok(stored)
    }

    fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let state = self.lock()?;
        let filtered: Vec<AuditRecord> = state
            .audit
            .iter()
            .filter(|record| matches_query(record, query))
            .cloned()
            .collect();
        let total = u64::try_from(filtered.len()).unwrap_or(u64::MAX);
        Ok(AuditPage {
            records: paginate(filtered, query),
            total,
        })
    }

    fn latest_audit_hash(&self) -> Result<Option<String>, StoreError> {
        let state = self.lock()?;
        Ok(state.audit.last().map(|record| record.hash.clone()))
    }

    fn verify_audit_chain(&self) -> Result<ChainVerification, StoreError> {
        let state = self.lock()?;
        Ok(hashing::verify_chain(&state.audit))
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
        let mut state = self.lock()?;
        let now = Timestamp::now();
        match state.policies.get(policy.name.as_str()).cloned() {
            Some(existing) => {
                state.next_version_id += 1;
                let snapshot = PolicyVersion {
                    id: state.next_version_id,
                    policy_name: existing.name.clone(),
                    version: existing.version,
                    agent_id: existing.agent_id.clone(),
                    rules: existing.rules.clone(),
                    author: author.to_string(),
                    created_at: now,
                };
                state.versions.push(snapshot);
                let version = existing.version + 1;
                let mut updated = policy.clone();
                updated.version = version;
                updated.created_at = existing.created_at;
                updated.updated_at = now;
                state.policies.insert(policy.name.as_str().to_string(), updated);
                Ok(PolicyUpsert {
                    created: false,
                    version,
                })
            }
            None => {
                let mut created = policy.clone();
                created.version = policy.version.max(1);
                created.updated_at = now;
                let version = created.version;
                state.policies.insert(policy.name.as_str().to_string(), created);
                Ok(PolicyUpsert {
                    created: true,
                    version,
                })
            }
        }
    }

    fn get_policy(&self, name: &PolicyName) -> Result<Option<Policy>, StoreError> {
        let state = self.lock()?;
        Ok(state.policies.get(name.as_str()).cloned())
    }

    fn list_policies(&self) -> Result<Vec<Policy>, StoreError> {
        let state = self.lock()?;
        Ok(state.policies.values().cloned().collect())
    }

    fn delete_policy(&self, name: &PolicyName) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        Ok(state.policies.remove(name.as_str()).is_some())
    }

    fn resolve_active_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError> {
        let state = self.lock()?;
        let newest = |candidates: Vec<&Policy>| {
            candidates.into_iter().max_by_key(|policy| policy.updated_at).cloned()
        };
        let agent_specific: Vec<&Policy> = state
            .policies
            .values()
            .filter(|policy| policy.agent_id.as_ref() == Some(agent_id))
            .collect();
        if !agent_specific.is_empty() {
            return Ok(newest(agent_specific));
        }
        let global: Vec<&Policy> =
            state.policies.values().filter(|policy| policy.agent_id.is_none()).collect();
        Ok(newest(global))
    }

    fn policy_history(&self, name: &PolicyName) -> Result<Vec<PolicyVersion>, StoreError> {
        let state = self.lock()?;
        let mut history: Vec<PolicyVersion> = state
            .versions
            .iter()
            .filter(|version| version.policy_name == *name)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(history)
    }

    fn policy_version(&self, id: i64) -> Result<Option<PolicyVersion>, StoreError> {
        let state = self.lock()?;
        Ok(state.versions.iter().find(|version| version.id == id).cloned())
    }

    fn register_agent(&self, config: &AgentConfig) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.agents.insert(config.agent_id.as_str().to_string(), config.clone());
        Ok(())
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>, StoreError> {
        let state = self.lock()?;
        Ok(state.agents.get(agent_id.as_str()).cloned())
    }

    fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(agent) = state.agents.get_mut(agent_id.as_str()) else {
            return Ok(false);
        };
        agent.status = status;
        agent.last_active_at = Some(at);
        Ok(true)
    }

    fn list_agents(&self) -> Result<Vec<AgentConfig>, StoreError> {
        let state = self.lock()?;
        Ok(state.agents.values().cloned().collect())
    }

    fn delete_agent(&self, agent_id: &AgentId) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        Ok(state.agents.remove(agent_id.as_str()).is_some())
    }

    fn approvals(&self) -> Option<&dyn ApprovalStore> {
        Some(self)
    }

    fn for_tenant(&self, tenant_id: &TenantId) -> Option<Arc<dyn GovernanceStore>> {
        Some(Arc::new(Self {
            state: Arc::clone(&self.state),
            tenant: Some(tenant_id.clone()),
        }))
    }

    fn apply_migrations(&self) -> Result<u32, StoreError> {
        Ok(0)
    }

    fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(MEMORY_SCHEMA_VERSION)
    }
}

impl ApprovalStore for InMemoryGovernanceStore {
    fn create_approval(&self, request: NewApprovalRequest) -> Result<ApprovalRequest, StoreError> {
        let mut state = self.lock()?;
        state.next_approval_id += 1;
        let stored = ApprovalRequest {
            id: state.next_approval_id,
            tenant_id: self.tenant.clone().or(request.tenant_id),
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
        };
        state.approvals.push(stored.clone());
        Ok(stored)
    }

    fn get_approval(&self, id: i64) -> Result<Option<ApprovalRequest>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .approvals
            .iter()
            .find(|approval| approval.id == id && self.in_scope(approval))
            .cloned())
    }

    fn list_approvals(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .approvals
            .iter()
            .filter(|approval| {
                self.in_scope(approval)
                    && filter.status.is_none_or(|status| approval.status == status)
                    && filter
                        .agent_id
                        .as_ref()
                        .is_none_or(|agent_id| &approval.agent_id == agent_id)
            })
            .cloned()
            .collect())
    }

    fn resolve_approval(
        &self,
        id: i64,
        resolution: &ApprovalResolution,
        now: Timestamp,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        let mut state = self.lock()?;
        let tenant = self.tenant.clone();
        let Some(approval) = state.approvals.iter_mut().find(|approval| {
            approval.id == id && tenant.as_ref().is_none_or(|t| approval.tenant_id.as_ref() == Some(t))
        }) else {
            return Ok(None);
        };
        let within_deadline =
            resolution.decision == ApprovalDecision::Timeout || approval.deadline >= now;
        if approval.status != ApprovalStatus::Pending || !within_deadline {
            return Ok(None);
        }
        approval.status = resolution.decision.status();
        approval.approver = resolution.approver.clone();
        approval.comment = resolution.comment.clone();
        approval.resolved_at = Some(now);
        Ok(Some(approval.clone()))
    }
}

impl InMemoryGovernanceStore {
    /// Returns true when an approval row is visible from this handle.
    fn in_scope(&self, approval: &ApprovalRequest) -> bool {
        self.tenant.as_ref().is_none_or(|tenant| approval.tenant_id.as_ref() == Some(tenant))
    }
}
