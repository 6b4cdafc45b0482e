// warden-core/src/core/event.rs
// ============================================================================
// Module: Event Taxonomy
// Description: Closed governance event set and envelope.
// Purpose: Provide stable dotted-name event types for observability.
// Dependencies: serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! The core emits a closed set of twenty dotted-name events. The envelope
//! carries the event type, an RFC 3339 timestamp, optional trace, agent,
//! and tenant identifiers, and a free-form data map. Listeners receive the
//! envelope by value and never block the emitter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AgentId;
use crate::core::identifiers::TenantId;
use crate::core::time::Timestamp;
use crate::core::trace::TraceId;

// ============================================================================
// SECTION: Event Type
// ============================================================================

/// Closed set of governance event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A tool call was allowed.
    #[serde(rename = "tool_call.allowed")]
    ToolCallAllowed,
    /// A tool call was denied.
    #[serde(rename = "tool_call.denied")]
    ToolCallDenied,
    /// A tool call errored downstream.
    #[serde(rename = "tool_call.error")]
    ToolCallError,
    /// A pending approval was created.
    #[serde(rename = "approval.requested")]
    ApprovalRequested,
    /// A pending approval was granted.
    #[serde(rename = "approval.granted")]
    ApprovalGranted,
    /// A pending approval was rejected.
    #[serde(rename = "approval.rejected")]
    ApprovalRejected,
    /// A pending approval expired.
    #[serde(rename = "approval.timeout")]
    ApprovalTimeout,
    /// An agent transitioned to running.
    #[serde(rename = "agent.started")]
    AgentStarted,
    /// An agent transitioned to stopped.
    #[serde(rename = "agent.stopped")]
    AgentStopped,
    /// An agent reported an error.
    #[serde(rename = "agent.error")]
    AgentError,
    /// An agent configuration was written.
    #[serde(rename = "agent.config_changed")]
    AgentConfigChanged,
    /// A policy was created.
    #[serde(rename = "policy.created")]
    PolicyCreated,
    /// A policy was overwritten.
    #[serde(rename = "policy.updated")]
    PolicyUpdated,
    /// A policy was deleted.
    #[serde(rename = "policy.deleted")]
    PolicyDeleted,
    /// A kill switch was activated.
    #[serde(rename = "killswitch.activated")]
    KillSwitchActivated,
    /// A kill switch was reset.
    #[serde(rename = "killswitch.deactivated")]
    KillSwitchDeactivated,
    /// Chain verification found a broken record.
    #[serde(rename = "audit.integrity_violation")]
    AuditIntegrityViolation,
    /// An audit write failed; durability was lost.
    #[serde(rename = "audit.write_failure")]
    AuditWriteFailure,
    /// The injection detector flagged a call.
    #[serde(rename = "injection.detected")]
    InjectionDetected,
    /// A rate limit was exceeded.
    #[serde(rename = "rate_limit.exceeded")]
    RateLimitExceeded,
}

impl EventType {
    /// Returns the stable dotted event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolCallAllowed => "tool_call.allowed",
            Self::ToolCallDenied => "tool_call.denied",
            Self::ToolCallError => "tool_call.error",
            Self::ApprovalRequested => "approval.requested",
            Self::ApprovalGranted => "approval.granted",
            Self::ApprovalRejected => "approval.rejected",
            Self::ApprovalTimeout => "approval.timeout",
            Self::AgentStarted => "agent.started",
            Self::AgentStopped => "agent.stopped",
            Self::AgentError => "agent.error",
            Self::AgentConfigChanged => "agent.config_changed",
            Self::PolicyCreated => "policy.created",
            Self::PolicyUpdated => "policy.updated",
            Self::PolicyDeleted => "policy.deleted",
            Self::KillSwitchActivated => "killswitch.activated",
            Self::KillSwitchDeactivated => "killswitch.deactivated",
            Self::AuditIntegrityViolation => "audit.integrity_violation",
            Self::AuditWriteFailure => "audit.write_failure",
            Self::InjectionDetected => "injection.detected",
            Self::RateLimitExceeded => "rate_limit.exceeded",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Event Envelope
// ============================================================================

/// Free-form event payload map.
pub type EventData = serde_json::Map<String, Value>;

/// Governance event envelope delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// RFC 3339 emission timestamp.
    pub timestamp: String,
    /// Trace identifier of the originating work, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// Agent the event concerns, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Tenant scope of the emitting orchestrator, when scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    /// Event payload.
    pub data: EventData,
}

impl GovernanceEvent {
    /// Creates an envelope stamped with the current instant.
    #[must_use]
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Timestamp::now().to_rfc3339(),
            trace_id: None,
            agent_id: None,
            tenant_id: None,
            data,
        }
    }

    /// Attaches a trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Attaches an agent identifier.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Attaches a tenant identifier.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }
}
