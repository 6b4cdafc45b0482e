// warden-core/src/runtime/approval.rs
// ============================================================================
// Module: Approval Coordinator
// Description: Two-phase decision lifecycle over an approval-capable store.
// Purpose: Create, resolve, and lazily time out pending decisions.
// Dependencies: serde_json, tracing, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The coordinator owns the approval lifecycle. Creation persists a pending
//! record with a deadline and emits `approval.requested`; the intercepted
//! decision stays in abeyance, so `tool_call.allowed` is never emitted on
//! this path. Resolution is optimistic: the store applies the terminal
//! transition only while the record is still pending and in deadline, and a
//! contention loser observes `resolved = false` with no side effects.
//!
//! Timeouts are lazy. Reads scan for pending records past their deadline
//! and materialize the `timeout` transition before returning, which removes
//! the need for a background sweeper. A pending record that is never
//! observed stays pending.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::core::ApprovalDecision;
use crate::core::ApprovalRequest;
use crate::core::ApprovalResolution;
use crate::core::AuditResult;
use crate::core::EventData;
use crate::core::EventType;
use crate::core::FailureCategory;
use crate::core::GovernanceError;
use crate::core::GovernanceEvent;
use crate::core::NewApprovalRequest;
use crate::core::NewAuditRecord;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::interfaces::ApprovalFilter;
use crate::interfaces::ApprovalStore;
use crate::interfaces::GovernanceStore;
use crate::runtime::bus::EventBus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default approval timeout in seconds.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 3600;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of a resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    /// True when this caller applied the terminal transition.
    pub resolved: bool,
    /// The record after resolution, when this caller won.
    pub request: Option<ApprovalRequest>,
}

// ============================================================================
// SECTION: Coordinator
// ============================================================================

/// Coordinates pending decisions over an approval-capable store.
pub struct ApprovalCoordinator {
    /// Persistence layer; must expose approval operations.
    store: Arc<dyn GovernanceStore>,
    /// Bus receiving approval lifecycle events.
    bus: Arc<EventBus>,
    /// Tenant scope stamped onto events.
    tenant: Option<TenantId>,
}

impl ApprovalCoordinator {
    /// Creates a coordinator over the provided store and bus.
    #[must_use]
    pub fn new(store: Arc<dyn GovernanceStore>, bus: Arc<EventBus>, tenant: Option<TenantId>) -> Self {
        Self {
            store,
            bus,
            tenant,
        }
    }

    /// Returns the approval operations or the capability error.
    fn approvals(&self) -> Result<&dyn ApprovalStore, GovernanceError> {
        self.store.approvals().ok_or_else(GovernanceError::approval_not_supported)
    }

    /// Persists a pending request and emits `approval.requested`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when the store lacks approval support or
    /// when persisting the pending record fails; the failure propagates so
    /// no decision escapes without its durable pending state.
    pub fn create(&self, request: NewApprovalRequest) -> Result<ApprovalRequest, GovernanceError> {
        let stored = self.approvals()?.create_approval(request)?;
        let mut data = EventData::new();
        data.insert("approvalId".to_string(), Value::from(stored.id));
        data.insert("tool".to_string(), Value::String(stored.tool.clone()));
        if let Some(parameters) = &stored.parameters {
            data.insert("parameters".to_string(), Value::Object(parameters.clone()));
        }
        data.insert(
            "policyName".to_string(),
            Value::String(stored.policy_name.as_str().to_string()),
        );
        if let Some(rule_name) = &stored.rule_name {
            data.insert("ruleName".to_string(), Value::String(rule_name.clone()));
        }
        data.insert("deadline".to_string(), Value::String(stored.deadline.to_rfc3339()));
        self.emit(EventType::ApprovalRequested, data, &stored);
        Ok(stored)
    }

    /// Applies a terminal resolution with optimistic concurrency.
    ///
    /// On success, emits the matching lifecycle event and appends an audit
    /// record: `allowed` for approvals, `denied` for rejections and
    /// timeouts, with the `approval_timeout` category on the timeout branch
    /// only. The audit write is best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when the store lacks approval support or
    /// the conditional update itself fails.
    pub fn resolve(
        &self,
        id: i64,
        resolution: ApprovalResolution,
    ) -> Result<ApprovalOutcome, GovernanceError> {
        let now = Timestamp::now();
        let Some(resolved) = self.approvals()?.resolve_approval(id, &resolution, now)? else {
            return Ok(ApprovalOutcome {
                resolved: false,
                request: None,
            });
        };

        let event_type = match resolution.decision {
            ApprovalDecision::Approved => EventType::ApprovalGranted,
            ApprovalDecision::Rejected => EventType::ApprovalRejected,
            ApprovalDecision::Timeout => EventType::ApprovalTimeout,
        };
        let mut data = EventData::new();
        data.insert("approvalId".to_string(), Value::from(resolved.id));
        data.insert("tool".to_string(), Value::String(resolved.tool.clone()));
        data.insert(
            "policyName".to_string(),
            Value::String(resolved.policy_name.as_str().to_string()),
        );
        if let Some(rule_name) = &resolved.rule_name {
            data.insert("ruleName".to_string(), Value::String(rule_name.clone()));
        }
        if let Some(approver) = &resolved.approver {
            data.insert("approver".to_string(), Value::String(approver.clone()));
        }
        if let Some(comment) = &resolved.comment {
            data.insert("comment".to_string(), Value::String(comment.clone()));
        }
        self.emit(event_type, data, &resolved);
        self.audit_resolution(&resolved, resolution.decision);

        Ok(ApprovalOutcome {
            resolved: true,
            request: Some(resolved),
        })
    }

    /// Loads a request, materializing an expired deadline as `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when the store lacks approval support or
    /// the read fails.
    pub fn get(&self, id: i64) -> Result<Option<ApprovalRequest>, GovernanceError> {
        let Some(request) = self.approvals()?.get_approval(id)? else {
            return Ok(None);
        };
        if request.is_expired(Timestamp::now()) {
            self.resolve(id, ApprovalResolution::new(ApprovalDecision::Timeout))?;
            return Ok(self.approvals()?.get_approval(id)?);
        }
        Ok(Some(request))
    }

    /// Lists requests, materializing expired deadlines before returning.
    ///
    /// The listing is re-read after timeout resolution so callers always
    /// observe consistent statuses.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] when the store lacks approval support or
    /// the read fails.
    pub fn list(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, GovernanceError> {
        let now = Timestamp::now();
        let listed = self.approvals()?.list_approvals(filter)?;
        let mut materialized = false;
        for request in &listed {
            if request.is_expired(now) {
                self.resolve(request.id, ApprovalResolution::new(ApprovalDecision::Timeout))?;
                materialized = true;
            }
        }
        if materialized {
            return Ok(self.approvals()?.list_approvals(filter)?);
        }
        Ok(listed)
    }

    /// Appends the resolution audit record, best-effort.
    fn audit_resolution(&self, resolved: &ApprovalRequest, decision: ApprovalDecision) {
        let result = match decision {
            ApprovalDecision::Approved => AuditResult::Allowed,
            ApprovalDecision::Rejected | ApprovalDecision::Timeout => AuditResult::Denied,
        };
        let mut record = NewAuditRecord::new(
            resolved.trace_id.clone(),
            resolved.agent_id.clone(),
            resolved.tool.clone(),
            result,
        );
        record.parameters = resolved.parameters.clone();
        record.reason = Some(match &resolved.approver {
            Some(approver) => {
                format!("Approval request {} {} by {approver}", resolved.id, decision.as_str())
            }
            None => format!("Approval request {} {}", resolved.id, decision.as_str()),
        });
        record.failure_category =
            (decision == ApprovalDecision::Timeout).then_some(FailureCategory::ApprovalTimeout);
        if let Err(err) = self.store.write_audit(record) {
            warn!(approval_id = resolved.id, error = %err, "approval audit write failed");
            let mut data = EventData::new();
            data.insert("context".to_string(), Value::String("approval_resolution".to_string()));
            data.insert("error".to_string(), Value::String(err.to_string()));
            let mut event = GovernanceEvent::new(EventType::AuditWriteFailure, data);
            event.trace_id = Some(resolved.trace_id.clone());
            event.tenant_id = self.tenant.clone();
            self.bus.emit_event(event);
        }
    }

    /// Emits an approval lifecycle event with trace and tenant attached.
    fn emit(&self, event_type: EventType, mut data: EventData, request: &ApprovalRequest) {
        if let Some(tenant) = &self.tenant {
            data.insert("tenantId".to_string(), Value::String(tenant.as_str().to_string()));
        }
        let mut event = GovernanceEvent::new(event_type, data);
        event.trace_id = Some(request.trace_id.clone());
        event.agent_id = Some(request.agent_id.clone());
        event.tenant_id = self.tenant.clone();
        self.bus.emit_event(event);
    }
}
