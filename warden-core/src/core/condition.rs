// warden-core/src/core/condition.rs
// ============================================================================
// Module: Condition Evaluator
// Description: Closed operator algebra over request parameter maps.
// Purpose: Match tool-call parameters against rule conditions fail-secure.
// Dependencies: regex, serde, serde_json
// ============================================================================

//! ## Overview
//! A condition maps parameter names to operator maps. Evaluation is
//! conjunctive on both axes: every operator under a parameter must hold, and
//! every parameter entry must hold. The operator set is closed (eleven
//! operators); an unknown operator name, a type mismatch, or an absent
//! parameter map under a non-empty condition all evaluate to `false` rather
//! than erroring. Missing or empty conditions evaluate to `true`; the guard
//! against over-broad rules is specificity, not emptiness.
//!
//! The `matches` operator screens its pattern before compilation: patterns
//! longer than 200 characters and patterns with nested-quantifier shapes
//! such as `(a+)+` or `(.*)*b` are rejected and evaluate to `false`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted length for a `matches` regex pattern.
pub const MAX_PATTERN_LENGTH: usize = 200;

// ============================================================================
// SECTION: Parameter Map
// ============================================================================

/// Tool-call parameter map with lexicographically ordered keys.
pub type ParameterMap = serde_json::Map<String, Value>;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Closed set of condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    /// Strict equality against the operand.
    Equals,
    /// Strict inequality; an absent parameter fails the check.
    NotEquals,
    /// String prefix predicate.
    StartsWith,
    /// String suffix predicate.
    EndsWith,
    /// String containment predicate.
    Contains,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-than.
    Lt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than-or-equal.
    Lte,
    /// Membership in an operand array.
    In,
    /// Screened regex match over a string parameter.
    Matches,
}

impl ConditionOperator {
    /// Parses an operator key, returning `None` for unknown names.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "equals" => Some(Self::Equals),
            "notEquals" => Some(Self::NotEquals),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "contains" => Some(Self::Contains),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            "matches" => Some(Self::Matches),
            _ => None,
        }
    }

    /// Returns the stable operator key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Matches => "matches",
        }
    }

    /// Applies the operator to a parameter value and operand.
    #[must_use]
    fn apply(self, actual: Option<&Value>, operand: &Value) -> bool {
        match self {
            Self::Equals => actual == Some(operand),
            Self::NotEquals => actual.is_some_and(|value| value != operand),
            Self::StartsWith => string_pair(actual, operand)
                .is_some_and(|(value, prefix)| value.starts_with(prefix)),
            Self::EndsWith => string_pair(actual, operand)
                .is_some_and(|(value, suffix)| value.ends_with(suffix)),
            Self::Contains => string_pair(actual, operand)
                .is_some_and(|(value, needle)| value.contains(needle)),
            Self::Gt => numeric_pair(actual, operand).is_some_and(|(left, right)| left > right),
            Self::Lt => numeric_pair(actual, operand).is_some_and(|(left, right)| left < right),
            Self::Gte => numeric_pair(actual, operand).is_some_and(|(left, right)| left >= right),
            Self::Lte => numeric_pair(actual, operand).is_some_and(|(left, right)| left <= right),
            Self::In => match (actual, operand.as_array()) {
                (Some(value), Some(candidates)) => candidates.contains(value),
                _ => false,
            },
            Self::Matches => apply_matches(actual, operand),
        }
    }
}

// ============================================================================
// SECTION: Condition
// ============================================================================

/// Operator map for one parameter: operator key to operand value.
pub type OperatorMap = BTreeMap<String, Value>;

/// Condition validation errors.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// An operator key is outside the closed operator set.
    #[error("unknown condition operator `{operator}` for parameter `{parameter}`")]
    UnknownOperator {
        /// Parameter the operator was attached to.
        parameter: String,
        /// Rejected operator key.
        operator: String,
    },
}

/// Mapping from parameter name to operator map, conjunctive on both axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition(BTreeMap<String, OperatorMap>);

impl Condition {
    /// Creates an empty condition, which evaluates to `true`.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds an operator entry for a parameter.
    #[must_use]
    pub fn with(mut self, parameter: impl Into<String>, operator: ConditionOperator, operand: Value) -> Self {
        self.0
            .entry(parameter.into())
            .or_default()
            .insert(operator.key().to_string(), operand);
        self
    }

    /// Returns true when the condition has no parameter entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true when at least one parameter carries at least one operator.
    ///
    /// This is the effective-condition test used by rule specificity.
    #[must_use]
    pub fn has_operators(&self) -> bool {
        self.0.values().any(|operators| !operators.is_empty())
    }

    /// Validates that every operator key is in the closed operator set.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::UnknownOperator`] for the first unknown key.
    pub fn validate(&self) -> Result<(), ConditionError> {
        for (parameter, operators) in &self.0 {
            for key in operators.keys() {
                if ConditionOperator::from_key(key).is_none() {
                    return Err(ConditionError::UnknownOperator {
                        parameter: parameter.clone(),
                        operator: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Evaluates the condition against a parameter map.
    ///
    /// A non-empty condition with no parameter map is `false`; an unknown
    /// operator encountered at runtime is `false`. Both are fail-secure.
    #[must_use]
    pub fn evaluate(&self, parameters: Option<&ParameterMap>) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let Some(parameters) = parameters else {
            return false;
        };
        for (parameter, operators) in &self.0 {
            let actual = parameters.get(parameter);
            for (key, operand) in operators {
                let Some(operator) = ConditionOperator::from_key(key) else {
                    return false;
                };
                if !operator.apply(actual, operand) {
                    return false;
                }
            }
        }
        true
    }
}

impl From<BTreeMap<String, OperatorMap>> for Condition {
    fn from(value: BTreeMap<String, OperatorMap>) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: Operand Helpers
// ============================================================================

/// Extracts a string parameter/operand pair, or `None` on type mismatch.
fn string_pair<'a>(actual: Option<&'a Value>, operand: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((actual?.as_str()?, operand.as_str()?))
}

/// Extracts a numeric parameter/operand pair, or `None` on type mismatch.
fn numeric_pair(actual: Option<&Value>, operand: &Value) -> Option<(f64, f64)> {
    Some((actual?.as_f64()?, operand.as_f64()?))
}

// ============================================================================
// SECTION: Regex Screening
// ============================================================================

/// Applies the `matches` operator with pattern screening.
fn apply_matches(actual: Option<&Value>, operand: &Value) -> bool {
    let Some(value) = actual.and_then(Value::as_str) else {
        return false;
    };
    let Some(pattern) = operand.as_str() else {
        return false;
    };
    if !is_safe_pattern(pattern) {
        return false;
    }
    match Regex::new(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(_) => false,
    }
}

/// Screens a regex pattern for length and catastrophic-backtracking shapes.
///
/// The screen is intentionally conservative: any quantifier applied to a
/// group whose body already contains a quantifier is rejected, which covers
/// `(a+)+`, `(x+x+)+y`, `(.*)*b`, and `([a-z]+)*`.
#[must_use]
pub fn is_safe_pattern(pattern: &str) -> bool {
    pattern.len() <= MAX_PATTERN_LENGTH && !has_nested_quantifier(pattern)
}

/// Detects a quantified group whose body contains a quantifier.
fn has_nested_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    // One flag per open group: has a quantifier been seen in its body?
    let mut groups = vec![false];
    let mut in_class = false;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'\\' {
            index += 2;
            continue;
        }
        if in_class {
            if byte == b']' {
                in_class = false;
            }
            index += 1;
            continue;
        }
        match byte {
            b'[' => in_class = true,
            b'(' => groups.push(false),
            b')' => {
                let body_quantified = groups.pop().unwrap_or(false);
                let quantified = matches!(bytes.get(index + 1), Some(b'+' | b'*' | b'{'));
                if body_quantified && quantified {
                    return true;
                }
                if quantified && let Some(enclosing) = groups.last_mut() {
                    *enclosing = true;
                }
            }
            b'+' | b'*' | b'{' => {
                if let Some(current) = groups.last_mut() {
                    *current = true;
                }
            }
            _ => {}
        }
        index += 1;
    }
    false
}
