// warden-core/src/core/approval.rs
// ============================================================================
// Module: Approval Records
// Description: Two-phase approval request types and lifecycle statuses.
// Purpose: Carry pending decisions between evaluation and human resolution.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! An approval request is created `pending` when an allow rule with
//! `require_approval` wins evaluation. It transitions exactly once to a
//! terminal status through explicit resolution or lazy timeout
//! materialization, and is never reopened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::condition::ParameterMap;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::PolicyName;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::trace::TraceId;

// ============================================================================
// SECTION: Approval Status
// ============================================================================

/// Lifecycle status of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting resolution.
    Pending,
    /// Approved by a human.
    Approved,
    /// Rejected by a human.
    Rejected,
    /// Expired past its deadline.
    Timeout,
}

impl ApprovalStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
        }
    }

    /// Parses a stable status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Terminal decision applied when resolving a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Grant the held tool call.
    Approved,
    /// Reject the held tool call.
    Rejected,
    /// Materialize an expired deadline.
    Timeout,
}

impl ApprovalDecision {
    /// Returns the terminal status this decision produces.
    #[must_use]
    pub const fn status(self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Rejected => ApprovalStatus::Rejected,
            Self::Timeout => ApprovalStatus::Timeout,
        }
    }

    /// Returns a stable label for the decision.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.status().as_str()
    }
}

// ============================================================================
// SECTION: Approval Request
// ============================================================================

/// Durable pending decision awaiting human resolution.
///
/// # Invariants
/// - Status transitions once from `pending` to a terminal state.
/// - `resolved_at` and `approver` are populated only on terminal records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    /// Store-assigned identifier.
    pub id: i64,
    /// Tenant scope, when created by a scoped orchestrator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// Agent that issued the held tool call.
    pub agent_id: AgentId,
    /// Tool held for approval.
    pub tool: String,
    /// Request parameters when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterMap>,
    /// Trace identifier of the originating evaluation.
    pub trace_id: TraceId,
    /// Policy whose rule intercepted the call.
    pub policy_name: PolicyName,
    /// Name of the intercepting rule, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// Instant after which the request is considered expired.
    pub deadline: Timestamp,
    /// Resolver identity on terminal records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Resolver comment on terminal records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Resolution instant on terminal records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

impl ApprovalRequest {
    /// Returns true when the record is pending past its deadline.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.status == ApprovalStatus::Pending && self.deadline < now
    }
}

/// Content of an approval request before the store assigns its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApprovalRequest {
    /// Tenant scope, when created by a scoped orchestrator.
    pub tenant_id: Option<TenantId>,
    /// Agent that issued the held tool call.
    pub agent_id: AgentId,
    /// Tool held for approval.
    pub tool: String,
    /// Request parameters when captured.
    pub parameters: Option<ParameterMap>,
    /// Trace identifier of the originating evaluation.
    pub trace_id: TraceId,
    /// Policy whose rule intercepted the call.
    pub policy_name: PolicyName,
    /// Name of the intercepting rule, when it has one.
    pub rule_name: Option<String>,
    /// Instant after which the request is considered expired.
    pub deadline: Timestamp,
    /// Creation instant.
    pub created_at: Timestamp,
}

/// Resolution applied to a pending approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResolution {
    /// Terminal decision.
    pub decision: ApprovalDecision,
    /// Resolver identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Resolver comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalResolution {
    /// Creates a resolution with the provided decision.
    #[must_use]
    pub const fn new(decision: ApprovalDecision) -> Self {
        Self {
            decision,
            approver: None,
            comment: None,
        }
    }

    /// Sets the resolver identity.
    #[must_use]
    pub fn by(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }

    /// Sets the resolver comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
