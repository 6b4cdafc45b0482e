// warden-core/src/runtime/engine.rs
// ============================================================================
// Module: Policy Engine
// Description: Deterministic rule selection with a specificity lattice.
// Purpose: Pick the winning rule for a request with a fail-secure floor.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! The engine is a pure function over a policy and a request: no I/O, no
//! clock, no randomness. A rule matches when its tool pattern covers the
//! request and its condition holds over the parameters. Matches rank by
//! specificity (exact pattern with an effective condition > exact pattern >
//! wildcard) and, at equal specificity, deny before allow: at a tie the
//! fail-secure choice is the more restrictive one. The sort is stable, so
//! input order never changes the outcome and the applied-rules vector
//! preserves consideration order among full ties.
//!
//! The fail-secure floor: no policy, an empty rule list, or no matching
//! rule all produce a deny.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::AgentId;
use crate::core::Effect;
use crate::core::ParameterMap;
use crate::core::Policy;
use crate::core::PolicyRule;
use crate::core::ToolPattern;
use crate::core::TraceId;

// ============================================================================
// SECTION: Request
// ============================================================================

/// One tool-call evaluation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// Agent issuing the call.
    pub agent_id: AgentId,
    /// Tool being called.
    pub tool: String,
    /// Request parameters, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterMap>,
    /// Caller-supplied trace identifier; invalid input is regenerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl EvaluationRequest {
    /// Creates a request for the provided agent and tool.
    #[must_use]
    pub fn new(agent_id: impl Into<AgentId>, tool: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tool: tool.into(),
            parameters: None,
            trace_id: None,
        }
    }

    /// Attaches request parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterMap) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Attaches a caller-supplied trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

// ============================================================================
// SECTION: Applied Rules
// ============================================================================

/// Summary of one matching rule in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRule {
    /// Rule name, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool pattern that matched.
    pub tool: ToolPattern,
    /// Rule effect.
    pub effect: Effect,
    /// Rule reason, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// True when the rule diverts into the approval workflow.
    pub require_approval: bool,
    /// Specificity rank assigned during matching.
    pub specificity: u8,
}

impl AppliedRule {
    /// Summarizes a matching rule with its specificity rank.
    fn from_rule(rule: &PolicyRule, specificity: u8) -> Self {
        Self {
            name: rule.name.clone(),
            tool: rule.tool.clone(),
            effect: rule.effect,
            reason: rule.reason.clone(),
            require_approval: rule.require_approval,
            specificity,
        }
    }
}

// ============================================================================
// SECTION: Evaluation Output
// ============================================================================

/// Engine output for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEvaluation {
    /// True when the winning effect is allow.
    pub allowed: bool,
    /// Trace identifier of the evaluation.
    pub trace_id: TraceId,
    /// Winning rule's reason, or a synthesized deny reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Every matching rule in priority order; the first entry won.
    pub applied_rules: Vec<AppliedRule>,
}

// ============================================================================
// SECTION: Policy Engine
// ============================================================================

/// Deterministic policy evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Creates a policy engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates a request against a policy.
    ///
    /// Same inputs produce identical output; the trace identifier is the
    /// caller's concern and is passed through untouched.
    #[must_use]
    pub fn evaluate(
        &self,
        policy: Option<&Policy>,
        request: &EvaluationRequest,
        trace_id: &TraceId,
    ) -> PolicyEvaluation {
        let Some(policy) = policy else {
            return deny(
                trace_id,
                format!("No policy configured for agent `{}`", request.agent_id),
                Vec::new(),
            );
        };

        let mut matches: Vec<AppliedRule> = Vec::new();
        for rule in &policy.rules {
            if !rule.tool.matches(&request.tool) {
                continue;
            }
            let condition_holds = rule
                .condition
                .as_ref()
                .is_none_or(|condition| condition.evaluate(request.parameters.as_ref()));
            if condition_holds {
                matches.push(AppliedRule::from_rule(rule, rule_specificity(rule)));
            }
        }

        // Stable sort: equal keys keep consideration order.
        matches.sort_by(|a, b| {
            b.specificity
                .cmp(&a.specificity)
                .then_with(|| effect_rank(a.effect).cmp(&effect_rank(b.effect)))
        });

        let Some(winner) = matches.first() else {
            return deny(
                trace_id,
                format!("No rule matched tool `{}` in policy `{}`", request.tool, policy.name),
                Vec::new(),
            );
        };

        let allowed = winner.effect == Effect::Allow;
        let reason = winner.reason.clone().or_else(|| {
            (!allowed).then(|| {
                format!("Denied by policy `{}` for tool `{}`", policy.name, request.tool)
            })
        });
        PolicyEvaluation {
            allowed,
            trace_id: trace_id.clone(),
            reason,
            applied_rules: matches,
        }
    }
}

/// Builds a deny evaluation with the provided reason.
fn deny(trace_id: &TraceId, reason: String, applied_rules: Vec<AppliedRule>) -> PolicyEvaluation {
    PolicyEvaluation {
        allowed: false,
        trace_id: trace_id.clone(),
        reason: Some(reason),
        applied_rules,
    }
}

/// Assigns the specificity rank of a rule.
///
/// 2: exact pattern with at least one effective operator. 1: exact pattern
/// without an effective condition. 0: wildcard pattern.
fn rule_specificity(rule: &PolicyRule) -> u8 {
    if rule.tool.is_wildcard() {
        return 0;
    }
    if rule.condition.as_ref().is_some_and(crate::core::Condition::has_operators) {
        2
    } else {
        1
    }
}

/// Orders deny before allow at equal specificity.
const fn effect_rank(effect: Effect) -> u8 {
    match effect {
        Effect::Deny => 0,
        Effect::Allow => 1,
    }
}
