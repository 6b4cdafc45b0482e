// warden-core/src/core/error.rs
// ============================================================================
// Module: Governance Errors
// Description: Single structured error kind for the governance core.
// Purpose: Carry stable codes, failure categories, and context fields.
// Dependencies: serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Every error surfaced by the orchestrator is one kind carrying a stable
//! string code, a failure category from the closed taxonomy, a message, and
//! an optional map of contextual fields. Validation errors are raised
//! synchronously and never produce an event or audit row; store failures on
//! the decision path are converted to fail-secure deny results instead of
//! errors wherever the contract calls for it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

use crate::core::audit::FailureCategory;
use crate::core::event::EventData;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error codes for the governance core and its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// `evaluate` input failed validation.
    InvalidRequest,
    /// Agent configuration failed validation.
    InvalidConfig,
    /// Policy input failed validation.
    InvalidPolicy,
    /// A store-requiring operation was called without a store.
    DatabaseRequired,
    /// A status write targeted a missing agent.
    AgentNotFound,
    /// A rollback referenced a missing policy version.
    VersionNotFound,
    /// An approval operation was called on a store without approvals.
    ApprovalNotSupported,
    /// Raised by the dispatch-wrapper collaborator on a deny decision.
    PolicyDenied,
    /// Raised by the dispatch-wrapper collaborator on downstream failure.
    ToolExecutionError,
    /// A persistence operation failed on a path that must propagate.
    StoreFailure,
}

impl ErrorCode {
    /// Returns the stable string code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InvalidPolicy => "INVALID_POLICY",
            Self::DatabaseRequired => "DATABASE_REQUIRED",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::VersionNotFound => "VERSION_NOT_FOUND",
            Self::ApprovalNotSupported => "APPROVAL_NOT_SUPPORTED",
            Self::PolicyDenied => "POLICY_DENIED",
            Self::ToolExecutionError => "TOOL_EXECUTION_ERROR",
            Self::StoreFailure => "STORE_FAILURE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Governance Error
// ============================================================================

/// Structured governance error.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct GovernanceError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Failure category from the closed taxonomy.
    pub category: FailureCategory,
    /// Human-readable message.
    pub message: String,
    /// Optional contextual fields.
    pub context: Option<EventData>,
}

impl GovernanceError {
    /// Creates an error with the provided code, category, and message.
    #[must_use]
    pub fn new(code: ErrorCode, category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            context: None,
        }
    }

    /// Attaches contextual fields.
    #[must_use]
    pub fn with_context(mut self, context: EventData) -> Self {
        self.context = Some(context);
        self
    }

    /// Invalid `evaluate` input.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, FailureCategory::ConfigError, message)
    }

    /// Invalid agent configuration.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, FailureCategory::ConfigError, message)
    }

    /// Invalid policy input.
    #[must_use]
    pub fn invalid_policy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPolicy, FailureCategory::ConfigError, message)
    }

    /// A store-requiring operation was called without a store.
    #[must_use]
    pub fn database_required(operation: &str) -> Self {
        Self::new(
            ErrorCode::DatabaseRequired,
            FailureCategory::ConfigError,
            format!("operation `{operation}` requires a persistence layer"),
        )
    }

    /// A status write targeted a missing agent.
    #[must_use]
    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(
            ErrorCode::AgentNotFound,
            FailureCategory::ConfigError,
            format!("agent `{agent_id}` is not registered"),
        )
    }

    /// A rollback referenced a missing policy version.
    #[must_use]
    pub fn version_not_found(version_id: i64) -> Self {
        Self::new(
            ErrorCode::VersionNotFound,
            FailureCategory::ConfigError,
            format!("policy version {version_id} does not exist"),
        )
    }

    /// An approval operation was called on a store without approvals.
    #[must_use]
    pub fn approval_not_supported() -> Self {
        Self::new(
            ErrorCode::ApprovalNotSupported,
            FailureCategory::ConfigError,
            "persistence layer does not support approval operations",
        )
    }

    /// A governed dispatch was denied; raised by the dispatch wrapper.
    #[must_use]
    pub fn policy_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyDenied, FailureCategory::PolicyDenial, reason)
    }

    /// Downstream tool execution failed; raised by the dispatch wrapper.
    #[must_use]
    pub fn tool_execution_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ToolExecutionError, FailureCategory::ToolError, message)
    }

    /// A persistence operation failed on a path that must propagate.
    #[must_use]
    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreFailure, FailureCategory::ProviderError, message)
    }
}
