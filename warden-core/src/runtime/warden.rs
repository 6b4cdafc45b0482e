// warden-core/src/runtime/warden.rs
// ============================================================================
// Module: Governance Orchestrator
// Description: The evaluate pipeline composing policy, audit, and events.
// Purpose: Produce and durably record decisions on the single canonical path.
// Dependencies: serde, serde_json, tracing, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The orchestrator is the single canonical execution path for Warden. One
//! `evaluate` call resolves a trace, consults the kill switch, resolves a
//! policy (inline, then persisted, then default-allow-all), invokes the
//! engine, and either diverts into the approval workflow or emits a
//! decision event and appends an audit record. Side effects are
//! best-effort: the returned decision never changes because an event or
//! audit write failed, and an `audit.write_failure` event is the only
//! signal that durability was lost.
//!
//! Tenant-scoped orchestrators derived with [`Warden::for_tenant`] share
//! the bus, engine, and kill-switch state (which is already per-tenant) but
//! carry a scoped persistence handle and an isolated inline policy slot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::AgentConfig;
use crate::core::AgentId;
use crate::core::AgentStatus;
use crate::core::ApprovalRequest;
use crate::core::ApprovalResolution;
use crate::core::AuditResult;
use crate::core::ChainVerification;
use crate::core::EventData;
use crate::core::EventType;
use crate::core::FailureCategory;
use crate::core::GovernanceError;
use crate::core::GovernanceEvent;
use crate::core::NewApprovalRequest;
use crate::core::NewAuditRecord;
use crate::core::Policy;
use crate::core::PolicyName;
use crate::core::PolicyVersion;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::core::TraceContext;
use crate::core::TraceId;
use crate::core::trace;
use crate::interfaces::ApprovalFilter;
use crate::interfaces::AuditPage;
use crate::interfaces::AuditQuery;
use crate::interfaces::GovernanceStore;
use crate::interfaces::PolicyUpsert;
use crate::runtime::approval::ApprovalCoordinator;
use crate::runtime::approval::ApprovalOutcome;
use crate::runtime::approval::DEFAULT_APPROVAL_TIMEOUT_SECS;
use crate::runtime::bus::EventBus;
use crate::runtime::engine::AppliedRule;
use crate::runtime::engine::EvaluationRequest;
use crate::runtime::engine::PolicyEngine;
use crate::runtime::killswitch::KillSwitch;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WardenConfig {
    /// Seconds granted to pending approvals before their deadline.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
        }
    }
}

/// Returns the default approval timeout in seconds.
const fn default_approval_timeout_secs() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

// ============================================================================
// SECTION: Decision
// ============================================================================

/// Externally visible outcome of one `evaluate` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// True when the call may proceed now.
    pub allowed: bool,
    /// Trace identifier carried by every artifact of this call.
    pub trace_id: TraceId,
    /// Populated on deny and on approval interception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Matching rules in priority order; the first entry won.
    pub applied_rules: Vec<AppliedRule>,
    /// True when the decision is held for approval.
    pub requires_approval: bool,
    /// Pending approval identifier on the interception path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<i64>,
    /// Pending approval deadline on the interception path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Timestamp>,
}

impl Decision {
    /// Builds a plain deny decision.
    fn deny(trace_id: TraceId, reason: impl Into<String>, applied_rules: Vec<AppliedRule>) -> Self {
        Self {
            allowed: false,
            trace_id,
            reason: Some(reason.into()),
            applied_rules,
            requires_approval: false,
            approval_id: None,
            deadline: None,
        }
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for a governance orchestrator.
#[derive(Default)]
pub struct WardenBuilder {
    /// Optional persistence layer.
    store: Option<Arc<dyn GovernanceStore>>,
    /// Optional inline policy.
    policy: Option<Policy>,
    /// Orchestrator configuration.
    config: WardenConfig,
}

impl WardenBuilder {
    /// Attaches a persistence layer.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn GovernanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Installs an inline policy that bypasses persisted resolution.
    #[must_use]
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Overrides the default configuration.
    #[must_use]
    pub fn config(mut self, config: WardenConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the orchestrator, wiring the bus and kill switch together.
    ///
    /// The bus's trace resolver defaults to the ambient task-local trace.
    #[must_use]
    pub fn build(self) -> Warden {
        let bus = Arc::new(EventBus::new());
        bus.set_trace_resolver(trace::current_trace_id);
        let kill_switch = Arc::new(KillSwitch::with_bus(Arc::clone(&bus)));
        Warden {
            store: self.store,
            bus,
            kill_switch,
            engine: PolicyEngine::new(),
            policy: RwLock::new(self.policy.map(Arc::new)),
            config: self.config,
            tenant: None,
        }
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Governance orchestrator composing the evaluate pipeline.
pub struct Warden {
    /// Optional persistence layer; absent on the zero-configuration path.
    store: Option<Arc<dyn GovernanceStore>>,
    /// Shared event bus.
    bus: Arc<EventBus>,
    /// Shared kill switch; its state is already scoped per tenant.
    kill_switch: Arc<KillSwitch>,
    /// Pure policy engine.
    engine: PolicyEngine,
    /// Inline policy slot; single writer, atomic publication.
    policy: RwLock<Option<Arc<Policy>>>,
    /// Orchestrator configuration.
    config: WardenConfig,
    /// Tenant scope attached to events and persistence.
    tenant: Option<TenantId>,
}

impl Warden {
    /// Returns a builder for the orchestrator.
    #[must_use]
    pub fn builder() -> WardenBuilder {
        WardenBuilder::default()
    }

    /// Creates an orchestrator with no store and no inline policy.
    #[must_use]
    pub fn new() -> Self {
        WardenBuilder::default().build()
    }

    /// Returns the shared event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Returns the shared kill switch.
    #[must_use]
    pub fn kill_switch(&self) -> &Arc<KillSwitch> {
        &self.kill_switch
    }

    /// Returns the tenant scope of this orchestrator, when scoped.
    #[must_use]
    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    /// Derives a tenant-scoped orchestrator.
    ///
    /// The scoped value shares the bus, engine, and kill-switch state; its
    /// persistence handle comes from the underlying store's `for_tenant`
    /// (falling back to the shared handle when scoping is unsupported) and
    /// its inline policy slot is isolated from the parent.
    #[must_use]
    pub fn for_tenant(&self, tenant_id: TenantId) -> Self {
        let scoped_store = match &self.store {
            None => None,
            Some(store) => Some(store.for_tenant(&tenant_id).unwrap_or_else(|| Arc::clone(store))),
        };
        let policy = self.policy.read().map(|guard| guard.clone()).unwrap_or_default();
        Self {
            store: scoped_store,
            bus: Arc::clone(&self.bus),
            kill_switch: Arc::clone(&self.kill_switch),
            engine: self.engine,
            policy: RwLock::new(policy),
            config: self.config.clone(),
            tenant: Some(tenant_id),
        }
    }

    // ------------------------------------------------------------------
    // Inline policy
    // ------------------------------------------------------------------

    /// Installs the inline policy after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] with code `INVALID_POLICY` when the
    /// policy fails validation.
    pub fn set_policy(&self, policy: Policy) -> Result<(), GovernanceError> {
        policy.validate().map_err(|err| GovernanceError::invalid_policy(err.to_string()))?;
        if let Ok(mut guard) = self.policy.write() {
            *guard = Some(Arc::new(policy));
        }
        Ok(())
    }

    /// Clears the inline policy, re-enabling persisted resolution.
    pub fn clear_policy(&self) {
        if let Ok(mut guard) = self.policy.write() {
            *guard = None;
        }
    }

    // ------------------------------------------------------------------
    // Evaluate pipeline
    // ------------------------------------------------------------------

    /// Decides one tool call.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] with code `INVALID_REQUEST` when input
    /// validation fails, and propagates the store failure when persisting a
    /// pending approval record fails. Every other side-effect failure is
    /// absorbed into the returned decision.
    pub fn evaluate(&self, request: &EvaluationRequest) -> Result<Decision, GovernanceError> {
        validate_request(request)?;
        let trace_id = TraceContext::resolve(request.trace_id.as_deref()).trace_id;
        let started = Instant::now();

        // Kill-switch short-circuit: policy and store are not consulted.
        if self.kill_switch.is_active(self.tenant.as_ref()) {
            return Ok(self.deny_for_kill_switch(request, trace_id, started));
        }

        let policy = match self.resolve_policy(&request.agent_id) {
            Ok(policy) => policy,
            Err(reason) => {
                let mut data = EventData::new();
                data.insert("reason".to_string(), Value::String(reason.clone()));
                self.emit(EventType::ToolCallDenied, data, &trace_id, Some(&request.agent_id));
                return Ok(Decision::deny(trace_id, reason, Vec::new()));
            }
        };

        let evaluation = self.engine.evaluate(Some(&policy), request, &trace_id);

        if evaluation.allowed
            && evaluation.applied_rules.first().is_some_and(|rule| rule.require_approval)
        {
            return self.intercept_for_approval(request, &policy, trace_id, evaluation.applied_rules);
        }

        let mut data = EventData::new();
        if let Some(reason) = &evaluation.reason {
            data.insert("reason".to_string(), Value::String(reason.clone()));
        }
        data.insert("appliedRules".to_string(), applied_rules_value(&evaluation.applied_rules));
        let event_type = if evaluation.allowed {
            EventType::ToolCallAllowed
        } else {
            EventType::ToolCallDenied
        };
        self.emit(event_type, data, &trace_id, Some(&request.agent_id));

        let result = if evaluation.allowed { AuditResult::Allowed } else { AuditResult::Denied };
        let mut record = NewAuditRecord::new(
            trace_id.clone(),
            request.agent_id.clone(),
            request.tool.clone(),
            result,
        );
        record.parameters = request.parameters.clone();
        record.reason = evaluation.reason.clone();
        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        record.failure_category = (!evaluation.allowed).then_some(FailureCategory::PolicyDenial);
        self.write_audit_best_effort(record, "policy_evaluation", &trace_id);

        Ok(Decision {
            allowed: evaluation.allowed,
            trace_id,
            reason: evaluation.reason,
            applied_rules: evaluation.applied_rules,
            requires_approval: false,
            approval_id: None,
            deadline: None,
        })
    }

    /// Denies a request while the kill switch is tripped.
    fn deny_for_kill_switch(
        &self,
        request: &EvaluationRequest,
        trace_id: TraceId,
        started: Instant,
    ) -> Decision {
        let status = self.kill_switch.status(self.tenant.as_ref());
        let reason = format!(
            "Kill-Switch active: {}",
            status.reason.as_deref().unwrap_or("no reason recorded")
        );

        let mut data = EventData::new();
        data.insert("reason".to_string(), Value::String(reason.clone()));
        data.insert("killSwitch".to_string(), Value::Bool(true));
        self.emit(EventType::ToolCallDenied, data, &trace_id, Some(&request.agent_id));

        let mut record = NewAuditRecord::new(
            trace_id.clone(),
            request.agent_id.clone(),
            request.tool.clone(),
            AuditResult::Denied,
        );
        record.parameters = request.parameters.clone();
        record.reason = Some(reason.clone());
        record.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        record.failure_category = Some(FailureCategory::PolicyDenial);
        self.write_audit_best_effort(record, "killswitch_denial", &trace_id);

        Decision::deny(trace_id, reason, Vec::new())
    }

    /// Resolves the effective policy for an agent.
    ///
    /// Inline wins over persisted; a persistence failure is fatal to the
    /// request and surfaces as the fail-secure deny reason in `Err`.
    fn resolve_policy(&self, agent_id: &AgentId) -> Result<Arc<Policy>, String> {
        if let Ok(guard) = self.policy.read()
            && let Some(policy) = guard.as_ref()
        {
            return Ok(Arc::clone(policy));
        }
        let Some(store) = &self.store else {
            return Ok(Arc::new(Policy::default_allow_all()));
        };
        match store.resolve_active_policy(agent_id) {
            Ok(Some(policy)) => Ok(Arc::new(policy)),
            Ok(None) => Ok(Arc::new(Policy::default_allow_all())),
            Err(err) => Err(format!("Policy resolution failed (fail-secure): {err}")),
        }
    }

    /// Diverts a winning approval-gated allow into the approval workflow.
    fn intercept_for_approval(
        &self,
        request: &EvaluationRequest,
        policy: &Policy,
        trace_id: TraceId,
        applied_rules: Vec<AppliedRule>,
    ) -> Result<Decision, GovernanceError> {
        let winner = applied_rules.first();
        let rule_name = winner.and_then(|rule| rule.name.clone());
        let reason = winner
            .and_then(|rule| rule.reason.clone())
            .unwrap_or_else(|| format!("Approval required for tool `{}`", request.tool));

        let approval_capable = self.store.as_ref().is_some_and(|store| store.approvals().is_some());
        if !approval_capable {
            // No store means no durable pending state: fail secure without
            // an audit row, preserving the no-DB-no-approval contract.
            let reason = "approval infrastructure not available".to_string();
            let mut data = EventData::new();
            data.insert("reason".to_string(), Value::String(reason.clone()));
            self.emit(EventType::ToolCallDenied, data, &trace_id, Some(&request.agent_id));
            return Ok(Decision {
                allowed: false,
                trace_id,
                reason: Some(reason),
                applied_rules,
                requires_approval: true,
                approval_id: None,
                deadline: None,
            });
        }

        let coordinator = self.coordinator()?;
        let now = Timestamp::now();
        let pending = coordinator.create(NewApprovalRequest {
            tenant_id: self.tenant.clone(),
            agent_id: request.agent_id.clone(),
            tool: request.tool.clone(),
            parameters: request.parameters.clone(),
            trace_id: trace_id.clone(),
            policy_name: policy.name.clone(),
            rule_name,
            deadline: now.plus_seconds(self.config.approval_timeout_secs),
            created_at: now,
        })?;

        Ok(Decision {
            allowed: false,
            trace_id,
            reason: Some(reason),
            applied_rules,
            requires_approval: true,
            approval_id: Some(pending.id),
            deadline: Some(pending.deadline),
        })
    }

    // ------------------------------------------------------------------
    // Approvals
    // ------------------------------------------------------------------

    /// Builds the approval coordinator over the attached store.
    fn coordinator(&self) -> Result<ApprovalCoordinator, GovernanceError> {
        let store =
            self.store.clone().ok_or_else(|| GovernanceError::database_required("approvals"))?;
        Ok(ApprovalCoordinator::new(store, Arc::clone(&self.bus), self.tenant.clone()))
    }

    /// Resolves a pending approval request.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when no store is attached, the store
    /// lacks approval support, or the conditional update fails.
    pub fn resolve_approval(
        &self,
        id: i64,
        resolution: ApprovalResolution,
    ) -> Result<ApprovalOutcome, GovernanceError> {
        self.coordinator()?.resolve(id, resolution)
    }

    /// Loads an approval request with lazy timeout materialization.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when no store is attached, the store
    /// lacks approval support, or the read fails.
    pub fn get_approval_request(&self, id: i64) -> Result<Option<ApprovalRequest>, GovernanceError> {
        self.coordinator()?.get(id)
    }

    /// Lists approval requests with lazy timeout materialization.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when no store is attached, the store
    /// lacks approval support, or the read fails.
    pub fn list_approval_requests(
        &self,
        filter: &ApprovalFilter,
    ) -> Result<Vec<ApprovalRequest>, GovernanceError> {
        self.coordinator()?.list(filter)
    }

    // ------------------------------------------------------------------
    // Policy administration
    // ------------------------------------------------------------------

    /// Persists a policy, snapshotting any prior row into history.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on validation failure, a missing store,
    /// or a store failure.
    pub fn save_policy(&self, policy: &Policy, author: &str) -> Result<PolicyUpsert, GovernanceError> {
        policy.validate().map_err(|err| GovernanceError::invalid_policy(err.to_string()))?;
        let store = self.require_store("save_policy")?;
        let upsert = store.upsert_policy(policy, author)?;
        let mut data = EventData::new();
        data.insert("policyName".to_string(), Value::String(policy.name.as_str().to_string()));
        data.insert("version".to_string(), Value::from(upsert.version));
        let event_type =
            if upsert.created { EventType::PolicyCreated } else { EventType::PolicyUpdated };
        self.emit_plain(event_type, data);
        Ok(upsert)
    }

    /// Deletes a persisted policy; returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn delete_policy(&self, name: &PolicyName) -> Result<bool, GovernanceError> {
        let store = self.require_store("delete_policy")?;
        let deleted = store.delete_policy(name)?;
        if deleted {
            let mut data = EventData::new();
            data.insert("policyName".to_string(), Value::String(name.as_str().to_string()));
            self.emit_plain(EventType::PolicyDeleted, data);
        }
        Ok(deleted)
    }

    /// Loads a persisted policy by name.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn get_policy(&self, name: &PolicyName) -> Result<Option<Policy>, GovernanceError> {
        Ok(self.require_store("get_policy")?.get_policy(name)?)
    }

    /// Lists persisted policies.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn list_policies(&self) -> Result<Vec<Policy>, GovernanceError> {
        Ok(self.require_store("list_policies")?.list_policies()?)
    }

    /// Lists history snapshots for a policy, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn policy_history(&self, name: &PolicyName) -> Result<Vec<PolicyVersion>, GovernanceError> {
        Ok(self.require_store("policy_history")?.policy_history(name)?)
    }

    /// Re-installs a history snapshot as a new policy version.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] with code `VERSION_NOT_FOUND` when the
    /// snapshot does not exist or belongs to a different policy.
    pub fn rollback_policy(
        &self,
        name: &PolicyName,
        version_id: i64,
    ) -> Result<Policy, GovernanceError> {
        let store = self.require_store("rollback_policy")?;
        let snapshot = store
            .policy_version(version_id)?
            .filter(|version| version.policy_name == *name)
            .ok_or_else(|| GovernanceError::version_not_found(version_id))?;
        let current = store.get_policy(name)?;
        let now = Timestamp::now();
        let restored = Policy {
            name: snapshot.policy_name.clone(),
            version: snapshot.version,
            agent_id: snapshot.agent_id.clone(),
            rules: snapshot.rules.clone(),
            created_at: current.as_ref().map_or(now, |policy| policy.created_at),
            updated_at: now,
        };
        let upsert = store.upsert_policy(&restored, "rollback")?;
        let mut data = EventData::new();
        data.insert("policyName".to_string(), Value::String(name.as_str().to_string()));
        data.insert("version".to_string(), Value::from(upsert.version));
        data.insert("rolledBackTo".to_string(), Value::from(version_id));
        self.emit_plain(EventType::PolicyUpdated, data);
        Ok(store.get_policy(name)?.unwrap_or(restored))
    }

    // ------------------------------------------------------------------
    // Agent administration
    // ------------------------------------------------------------------

    /// Registers or overwrites an agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] with code `INVALID_CONFIG` on validation
    /// failure, and on a missing store or store failure.
    pub fn register_agent(&self, config: &AgentConfig) -> Result<(), GovernanceError> {
        config.validate().map_err(|err| GovernanceError::invalid_config(err.to_string()))?;
        let store = self.require_store("register_agent")?;
        store.register_agent(config)?;
        let mut data = EventData::new();
        data.insert("agentId".to_string(), Value::String(config.agent_id.as_str().to_string()));
        let mut event = GovernanceEvent::new(EventType::AgentConfigChanged, data);
        event.agent_id = Some(config.agent_id.clone());
        event.tenant_id = self.tenant.clone();
        self.bus.emit_event(event);
        Ok(())
    }

    /// Writes an agent status and emits the matching lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] with code `AGENT_NOT_FOUND` when the
    /// agent is not registered, and on a missing store or store failure.
    pub fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
    ) -> Result<(), GovernanceError> {
        let store = self.require_store("update_agent_status")?;
        let updated = store.update_agent_status(agent_id, status, Timestamp::now())?;
        if !updated {
            return Err(GovernanceError::agent_not_found(agent_id.as_str()));
        }
        let event_type = match status {
            AgentStatus::Running => Some(EventType::AgentStarted),
            AgentStatus::Stopped => Some(EventType::AgentStopped),
            AgentStatus::Error => Some(EventType::AgentError),
            AgentStatus::Registered => None,
        };
        if let Some(event_type) = event_type {
            let mut data = EventData::new();
            data.insert("agentId".to_string(), Value::String(agent_id.as_str().to_string()));
            data.insert("status".to_string(), Value::String(status.as_str().to_string()));
            let mut event = GovernanceEvent::new(event_type, data);
            event.agent_id = Some(agent_id.clone());
            event.tenant_id = self.tenant.clone();
            self.bus.emit_event(event);
        }
        Ok(())
    }

    /// Loads an agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>, GovernanceError> {
        Ok(self.require_store("get_agent")?.get_agent(agent_id)?)
    }

    /// Lists registered agents.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn list_agents(&self) -> Result<Vec<AgentConfig>, GovernanceError> {
        Ok(self.require_store("list_agents")?.list_agents()?)
    }

    /// Deletes an agent; returns false when absent.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn delete_agent(&self, agent_id: &AgentId) -> Result<bool, GovernanceError> {
        Ok(self.require_store("delete_agent")?.delete_agent(agent_id)?)
    }

    // ------------------------------------------------------------------
    // Audit access
    // ------------------------------------------------------------------

    /// Queries audit records.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, GovernanceError> {
        Ok(self.require_store("query_audit")?.query_audit(query)?)
    }

    /// Returns the hash of the most recent audit record.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn latest_audit_hash(&self) -> Result<Option<String>, GovernanceError> {
        Ok(self.require_store("latest_audit_hash")?.latest_audit_hash()?)
    }

    /// Walks the audit chain, emitting `audit.integrity_violation` on a
    /// break.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn verify_audit_chain(&self) -> Result<ChainVerification, GovernanceError> {
        let verification = self.require_store("verify_audit_chain")?.verify_audit_chain()?;
        if !verification.valid {
            let mut data = EventData::new();
            if let Some(broken_at) = verification.broken_at {
                data.insert("brokenAt".to_string(), Value::from(broken_at));
            }
            data.insert("totalEvents".to_string(), Value::from(verification.total_events));
            data.insert("verifiedEvents".to_string(), Value::from(verification.verified_events));
            self.emit_plain(EventType::AuditIntegrityViolation, data);
        }
        Ok(verification)
    }

    /// Streams matching audit records as newline-delimited JSON.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] on a missing store or a store failure.
    pub fn export_audit(
        &self,
        query: &AuditQuery,
        out: &mut dyn std::io::Write,
    ) -> Result<u64, GovernanceError> {
        Ok(self.require_store("export_audit")?.export_audit(query, out)?)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Returns the store or the `DATABASE_REQUIRED` error.
    fn require_store(&self, operation: &str) -> Result<&Arc<dyn GovernanceStore>, GovernanceError> {
        self.store.as_ref().ok_or_else(|| GovernanceError::database_required(operation))
    }

    /// Emits a decision-path event with trace, agent, and tenant attached.
    fn emit(
        &self,
        event_type: EventType,
        mut data: EventData,
        trace_id: &TraceId,
        agent_id: Option<&AgentId>,
    ) {
        if let Some(tenant) = &self.tenant {
            data.insert("tenantId".to_string(), Value::String(tenant.as_str().to_string()));
        }
        let mut event = GovernanceEvent::new(event_type, data);
        event.trace_id = Some(trace_id.clone());
        event.agent_id = agent_id.cloned();
        event.tenant_id = self.tenant.clone();
        self.bus.emit_event(event);
    }

    /// Emits an administrative event with the tenant attached.
    fn emit_plain(&self, event_type: EventType, mut data: EventData) {
        if let Some(tenant) = &self.tenant {
            data.insert("tenantId".to_string(), Value::String(tenant.as_str().to_string()));
        }
        let mut event = GovernanceEvent::new(event_type, data);
        event.tenant_id = self.tenant.clone();
        self.bus.emit_event(event);
    }

    /// Appends an audit record, converting failure into a signal event.
    fn write_audit_best_effort(&self, record: NewAuditRecord, context: &str, trace_id: &TraceId) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.write_audit(record) {
            warn!(context, error = %err, "audit write failed; decision stands");
            let mut data = EventData::new();
            data.insert("context".to_string(), Value::String(context.to_string()));
            data.insert("error".to_string(), Value::String(err.to_string()));
            self.emit(EventType::AuditWriteFailure, data, trace_id, None);
        }
    }
}

impl Default for Warden {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates `evaluate` input at the boundary.
fn validate_request(request: &EvaluationRequest) -> Result<(), GovernanceError> {
    if request.agent_id.as_str().trim().is_empty() {
        return Err(GovernanceError::invalid_request("agentId must not be empty"));
    }
    if request.tool.trim().is_empty() {
        return Err(GovernanceError::invalid_request("tool must not be empty"));
    }
    Ok(())
}

/// Serializes applied rules into event payload form.
fn applied_rules_value(applied_rules: &[AppliedRule]) -> Value {
    serde_json::to_value(applied_rules).unwrap_or(Value::Array(Vec::new()))
}
