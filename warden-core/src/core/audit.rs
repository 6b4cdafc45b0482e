// warden-core/src/core/audit.rs
// ============================================================================
// Module: Audit Records
// Description: Append-only audit record types and failure taxonomy.
// Purpose: Define the tamper-evident record shape bound into the hash chain.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Audit records are insert-only rows bound into a SHA-256 hash chain by
//! their predecessor's hash. The record timestamp is carried as the already
//! formatted RFC 3339 string: the string participates in the hash input, so
//! it must never round-trip through a parser between write and verify.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::condition::ParameterMap;
use crate::core::identifiers::AgentId;
use crate::core::time::Timestamp;
use crate::core::trace::TraceId;

// ============================================================================
// SECTION: Audit Result
// ============================================================================

/// Outcome recorded on an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditResult {
    /// The tool call was allowed.
    Allowed,
    /// The tool call was denied.
    Denied,
    /// The tool call errored downstream.
    Error,
    /// Marker row anchoring the chain after retention pruning.
    RetentionBoundary,
}

impl AuditResult {
    /// Returns a stable label for the result.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
            Self::Error => "error",
            Self::RetentionBoundary => "retention-boundary",
        }
    }

    /// Parses a stable result label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "allowed" => Some(Self::Allowed),
            "denied" => Some(Self::Denied),
            "error" => Some(Self::Error),
            "retention-boundary" => Some(Self::RetentionBoundary),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Failure Category
// ============================================================================

/// Closed failure taxonomy tagged on denied or errored rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Downstream tool execution failed.
    ToolError,
    /// A policy rule denied the call.
    PolicyDenial,
    /// A provider timed out.
    ProviderTimeout,
    /// A provider errored.
    ProviderError,
    /// The injection detector flagged the call.
    InjectionAlert,
    /// Input or configuration was invalid.
    ConfigError,
    /// A rate limit was exceeded.
    RateLimit,
    /// A pending approval expired.
    ApprovalTimeout,
}

impl FailureCategory {
    /// Returns a stable label for the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolError => "tool_error",
            Self::PolicyDenial => "policy_denial",
            Self::ProviderTimeout => "provider_timeout",
            Self::ProviderError => "provider_error",
            Self::InjectionAlert => "injection_alert",
            Self::ConfigError => "config_error",
            Self::RateLimit => "rate_limit",
            Self::ApprovalTimeout => "approval_timeout",
        }
    }

    /// Parses a stable category label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "tool_error" => Some(Self::ToolError),
            "policy_denial" => Some(Self::PolicyDenial),
            "provider_timeout" => Some(Self::ProviderTimeout),
            "provider_error" => Some(Self::ProviderError),
            "injection_alert" => Some(Self::InjectionAlert),
            "config_error" => Some(Self::ConfigError),
            "rate_limit" => Some(Self::RateLimit),
            "approval_timeout" => Some(Self::ApprovalTimeout),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Audit Record
// ============================================================================

/// One row of the append-only audit log.
///
/// # Invariants
/// - Rows are insert-only; the storage boundary rejects update and delete.
/// - `previous_hash` is `None` only for the first record of the chain.
/// - `hash` covers the full record content plus the chain marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Store-assigned identifier; chain order is ascending id order.
    pub id: i64,
    /// Trace identifier shared with the originating evaluation.
    pub trace_id: TraceId,
    /// RFC 3339 timestamp string, hashed verbatim.
    pub timestamp: String,
    /// Agent that issued the tool call.
    pub agent_id: AgentId,
    /// Tool that was called.
    pub tool: String,
    /// Request parameters when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterMap>,
    /// Recorded outcome.
    pub result: AuditResult,
    /// Human-readable reason when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Decision latency in milliseconds.
    pub duration_ms: u64,
    /// Failure category on denied or errored rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,
    /// Hash of the predecessor record, `None` for the genesis record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// SHA-256 hash of this record, 64 lowercase hex characters.
    pub hash: String,
}

/// Content of an audit record before the store assigns id and chain hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    /// Trace identifier shared with the originating evaluation.
    pub trace_id: TraceId,
    /// RFC 3339 timestamp string, hashed verbatim.
    pub timestamp: String,
    /// Agent that issued the tool call.
    pub agent_id: AgentId,
    /// Tool that was called.
    pub tool: String,
    /// Request parameters when captured.
    pub parameters: Option<ParameterMap>,
    /// Recorded outcome.
    pub result: AuditResult,
    /// Human-readable reason when present.
    pub reason: Option<String>,
    /// Decision latency in milliseconds.
    pub duration_ms: u64,
    /// Failure category on denied or errored rows.
    pub failure_category: Option<FailureCategory>,
}

impl NewAuditRecord {
    /// Creates a record stamped with the current instant.
    #[must_use]
    pub fn new(trace_id: TraceId, agent_id: AgentId, tool: impl Into<String>, result: AuditResult) -> Self {
        Self {
            trace_id,
            timestamp: Timestamp::now().to_rfc3339(),
            agent_id,
            tool: tool.into(),
            parameters: None,
            result,
            reason: None,
            duration_ms: 0,
            failure_category: None,
        }
    }

    /// Completes the record with store-assigned chain fields.
    #[must_use]
    pub fn into_record(self, id: i64, previous_hash: Option<String>, hash: String) -> AuditRecord {
        AuditRecord {
            id,
            trace_id: self.trace_id,
            timestamp: self.timestamp,
            agent_id: self.agent_id,
            tool: self.tool,
            parameters: self.parameters,
            result: self.result,
            reason: self.reason,
            duration_ms: self.duration_ms,
            failure_category: self.failure_category,
            previous_hash,
            hash,
        }
    }
}
