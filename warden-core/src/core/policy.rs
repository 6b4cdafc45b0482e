// warden-core/src/core/policy.rs
// ============================================================================
// Module: Policy Model
// Description: Policy, rule, and version snapshot types with validation.
// Purpose: Provide the canonical rule schema consumed by the policy engine.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! Policies are ordered rule lists keyed by name and optionally bound to a
//! single agent. A rule targets one tool exactly or the wildcard `*`, and
//! may carry a condition over request parameters. Rules accept a rate-limit
//! descriptor for forward compatibility; nothing in the engine reads it.
//! Validation happens at the boundary; the engine itself stays total and
//! fail-secure over whatever it is handed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::condition::Condition;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::PolicyName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of rules accepted in one policy.
pub const MAX_POLICY_RULES: usize = 1000;
/// Literal tool pattern matching every tool.
pub const WILDCARD_TOOL: &str = "*";
/// Name of the synthetic zero-configuration policy.
pub const DEFAULT_ALLOW_ALL_POLICY: &str = "default-allow-all";

// ============================================================================
// SECTION: Tool Pattern
// ============================================================================

/// Tool pattern: an exact tool name or the literal wildcard `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolPattern(String);

impl ToolPattern {
    /// Creates a pattern for an exact tool name.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Returns the wildcard pattern.
    #[must_use]
    pub fn wildcard() -> Self {
        Self(WILDCARD_TOOL.to_string())
    }

    /// Returns true when the pattern is the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_TOOL
    }

    /// Returns true when the pattern covers the provided tool name.
    #[must_use]
    pub fn matches(&self, tool: &str) -> bool {
        self.is_wildcard() || self.0 == tool
    }

    /// Returns the pattern as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ToolPattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Effect
// ============================================================================

/// Rule effect applied when a rule wins evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Permit the tool call.
    Allow,
    /// Deny the tool call.
    Deny,
}

impl Effect {
    /// Returns a stable label for the effect.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

// ============================================================================
// SECTION: Rate Limit Descriptor
// ============================================================================

/// Rate-limit descriptor accepted on rules but not enforced by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    /// Maximum calls allowed inside the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u64>,
    /// Window length in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
}

// ============================================================================
// SECTION: Policy Rule
// ============================================================================

/// One ordered rule inside a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Optional rule name surfaced on approvals and applied-rule vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool pattern the rule targets.
    pub tool: ToolPattern,
    /// Effect when the rule wins.
    pub effect: Effect,
    /// Optional condition over request parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Optional human-readable reason surfaced verbatim on decisions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Accepted-but-unused rate-limit descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    /// Diverts a winning allow into the approval workflow.
    #[serde(default)]
    pub require_approval: bool,
}

impl PolicyRule {
    /// Creates a rule with the provided pattern and effect.
    #[must_use]
    pub fn new(tool: ToolPattern, effect: Effect) -> Self {
        Self {
            name: None,
            tool,
            effect,
            condition: None,
            reason: None,
            rate_limit: None,
            require_approval: false,
        }
    }

    /// Sets the rule name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the rule condition.
    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Sets the human-readable reason.
    #[must_use]
    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks the rule as approval-gated.
    #[must_use]
    pub const fn requiring_approval(mut self) -> Self {
        self.require_approval = true;
        self
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Policy validation errors.
#[derive(Debug, Error)]
pub enum PolicyValidationError {
    /// Policy name is empty.
    #[error("policy name must not be empty")]
    EmptyName,
    /// Rule count is outside 1..=1000.
    #[error("policy must contain between 1 and {MAX_POLICY_RULES} rules (got {0})")]
    RuleCountOutOfRange(usize),
    /// A rule has an empty tool pattern.
    #[error("rule {index}: tool pattern must not be empty")]
    EmptyToolPattern {
        /// Zero-based rule index.
        index: usize,
    },
    /// A rule condition uses an operator outside the closed set.
    #[error("rule {index}: {source}")]
    InvalidCondition {
        /// Zero-based rule index.
        index: usize,
        /// Underlying condition error.
        source: crate::core::condition::ConditionError,
    },
}

/// Named, versioned, ordered rule list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Policy name.
    pub name: PolicyName,
    /// Monotonic version, bumped by the store on overwrite.
    pub version: u32,
    /// Binds the policy to one agent; `None` means globally applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Ordered rules; earlier entries win only through specificity.
    pub rules: Vec<PolicyRule>,
    /// Creation instant.
    pub created_at: Timestamp,
    /// Last-update instant.
    pub updated_at: Timestamp,
}

impl Policy {
    /// Creates a version-1 policy with the provided rules.
    #[must_use]
    pub fn new(name: PolicyName, rules: Vec<PolicyRule>) -> Self {
        let now = Timestamp::now();
        Self {
            name,
            version: 1,
            agent_id: None,
            rules,
            created_at: now,
            updated_at: now,
        }
    }

    /// Binds the policy to a single agent.
    #[must_use]
    pub fn for_agent(mut self, agent_id: AgentId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Returns the synthetic allow-all policy used on the zero-config path.
    #[must_use]
    pub fn default_allow_all() -> Self {
        Self::new(
            PolicyName::new(DEFAULT_ALLOW_ALL_POLICY),
            vec![PolicyRule::new(ToolPattern::wildcard(), Effect::Allow)],
        )
    }

    /// Validates the policy shape at the input boundary.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyValidationError`] for an empty name, an out-of-range
    /// rule count, an empty tool pattern, or an unknown condition operator.
    pub fn validate(&self) -> Result<(), PolicyValidationError> {
        if self.name.as_str().trim().is_empty() {
            return Err(PolicyValidationError::EmptyName);
        }
        if self.rules.is_empty() || self.rules.len() > MAX_POLICY_RULES {
            return Err(PolicyValidationError::RuleCountOutOfRange(self.rules.len()));
        }
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.tool.as_str().is_empty() {
                return Err(PolicyValidationError::EmptyToolPattern {
                    index,
                });
            }
            if let Some(condition) = &rule.condition {
                condition.validate().map_err(|source| PolicyValidationError::InvalidCondition {
                    index,
                    source,
                })?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Policy Version Snapshot
// ============================================================================

/// Snapshot of a policy taken immediately before an overwrite.
///
/// # Invariants
/// - The snapshot records the policy as it was, not as it will be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    /// Store-assigned snapshot identifier.
    pub id: i64,
    /// Name of the snapshotted policy.
    pub policy_name: PolicyName,
    /// Version the policy carried when snapshotted.
    pub version: u32,
    /// Agent binding the policy carried when snapshotted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Rules the policy carried when snapshotted.
    pub rules: Vec<PolicyRule>,
    /// Author of the overwrite that produced this snapshot.
    pub author: String,
    /// Snapshot instant.
    pub created_at: Timestamp,
}
