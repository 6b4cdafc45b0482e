// warden-core/src/core/agent.rs
// ============================================================================
// Module: Agent Registry Types
// Description: Agent configuration and lifecycle status.
// Purpose: Provide the registry record shape persisted per governed agent.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Agent records describe a governed caller: its allowed tools, its bound
//! policy, and a free-form lifecycle status. Status transitions carry no
//! ordering restrictions; `last_active_at` advances only on explicit status
//! writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::condition::ParameterMap;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::PolicyName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Agent Status
// ============================================================================

/// Free-form agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent is registered but not running.
    Registered,
    /// Agent is running.
    Running,
    /// Agent is stopped.
    Stopped,
    /// Agent reported an error.
    Error,
}

impl AgentStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Parses a stable status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "registered" => Some(Self::Registered),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Agent Configuration
// ============================================================================

/// Agent configuration validation errors.
#[derive(Debug, Error)]
pub enum AgentConfigError {
    /// Agent identifier is empty.
    #[error("agent id must not be empty")]
    EmptyAgentId,
    /// Agent display name is empty.
    #[error("agent name must not be empty")]
    EmptyName,
}

/// Registered agent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tools the agent is expected to call.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Policy bound to this agent, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<PolicyName>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParameterMap>,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Registration instant.
    pub registered_at: Timestamp,
    /// Advances only on explicit status writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<Timestamp>,
}

impl AgentConfig {
    /// Creates a registered agent with the provided identifier and name.
    #[must_use]
    pub fn new(agent_id: AgentId, name: impl Into<String>) -> Self {
        Self {
            agent_id,
            name: name.into(),
            description: None,
            allowed_tools: Vec::new(),
            policy_name: None,
            metadata: None,
            status: AgentStatus::Registered,
            registered_at: Timestamp::now(),
            last_active_at: None,
        }
    }

    /// Validates the configuration at the input boundary.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError`] for an empty identifier or name.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if self.agent_id.as_str().trim().is_empty() {
            return Err(AgentConfigError::EmptyAgentId);
        }
        if self.name.trim().is_empty() {
            return Err(AgentConfigError::EmptyName);
        }
        Ok(())
    }
}
