// warden-core/tests/condition.rs
// ============================================================================
// Module: Condition Evaluator Tests
// Description: Validate the closed operator algebra and its fail-secure edges.
// ============================================================================
//! ## Overview
//! Exercises every operator, conjunction on both axes, unknown-operator
//! rejection, and the regex screening applied to `matches`.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use warden_core::Condition;
use warden_core::ConditionOperator;
use warden_core::ParameterMap;
use warden_core::core::condition::is_safe_pattern;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn params(pairs: &[(&str, serde_json::Value)]) -> ParameterMap {
    let mut map = ParameterMap::new();
    for (key, value) in pairs {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

// ============================================================================
// SECTION: Operator Semantics
// ============================================================================

/// Tests equals and notEquals, including the absent-parameter edge.
#[test]
fn test_equality_operators() {
    let equals = Condition::new().with("mode", ConditionOperator::Equals, json!("fast"));
    assert!(equals.evaluate(Some(&params(&[("mode", json!("fast"))]))));
    assert!(!equals.evaluate(Some(&params(&[("mode", json!("slow"))]))));
    assert!(!equals.evaluate(Some(&params(&[]))));

    let not_equals = Condition::new().with("mode", ConditionOperator::NotEquals, json!("fast"));
    assert!(not_equals.evaluate(Some(&params(&[("mode", json!("slow"))]))));
    assert!(!not_equals.evaluate(Some(&params(&[("mode", json!("fast"))]))));
    // Absent parameter fails notEquals: fail-secure.
    assert!(!not_equals.evaluate(Some(&params(&[]))));
}

/// Tests string predicates degrade to false on type mismatch.
#[test]
fn test_string_operators() {
    let starts = Condition::new().with("path", ConditionOperator::StartsWith, json!("/etc/"));
    assert!(starts.evaluate(Some(&params(&[("path", json!("/etc/passwd"))]))));
    assert!(!starts.evaluate(Some(&params(&[("path", json!("/tmp/x"))]))));
    assert!(!starts.evaluate(Some(&params(&[("path", json!(42))]))));

    let ends = Condition::new().with("path", ConditionOperator::EndsWith, json!(".log"));
    assert!(ends.evaluate(Some(&params(&[("path", json!("/var/app.log"))]))));
    assert!(!ends.evaluate(Some(&params(&[("path", json!("/var/app.txt"))]))));

    let contains = Condition::new().with("url", ConditionOperator::Contains, json!("internal"));
    assert!(contains.evaluate(Some(&params(&[("url", json!("https://internal.example"))]))));
    assert!(!contains.evaluate(Some(&params(&[("url", json!(true))]))));
}

/// Tests numeric comparisons over integers and floats.
#[test]
fn test_numeric_operators() {
    let gt = Condition::new().with("size", ConditionOperator::Gt, json!(10));
    assert!(gt.evaluate(Some(&params(&[("size", json!(11))]))));
    assert!(!gt.evaluate(Some(&params(&[("size", json!(10))]))));
    assert!(!gt.evaluate(Some(&params(&[("size", json!("11"))]))));

    let gte = Condition::new().with("size", ConditionOperator::Gte, json!(10));
    assert!(gte.evaluate(Some(&params(&[("size", json!(10))]))));

    let lt = Condition::new().with("size", ConditionOperator::Lt, json!(2.5));
    assert!(lt.evaluate(Some(&params(&[("size", json!(2.4))]))));

    let lte = Condition::new().with("size", ConditionOperator::Lte, json!(2.5));
    assert!(lte.evaluate(Some(&params(&[("size", json!(2.5))]))));
    assert!(!lte.evaluate(Some(&params(&[("size", json!(2.6))]))));
}

/// Tests membership requires an array operand.
#[test]
fn test_in_operator() {
    let condition = Condition::new().with("env", ConditionOperator::In, json!(["dev", "staging"]));
    assert!(condition.evaluate(Some(&params(&[("env", json!("dev"))]))));
    assert!(!condition.evaluate(Some(&params(&[("env", json!("prod"))]))));
    assert!(!condition.evaluate(Some(&params(&[]))));

    let scalar_operand = Condition::new().with("env", ConditionOperator::In, json!("dev"));
    assert!(!scalar_operand.evaluate(Some(&params(&[("env", json!("dev"))]))));
}

/// Tests matches applies only to string parameters with safe patterns.
#[test]
fn test_matches_operator() {
    let condition = Condition::new().with("name", ConditionOperator::Matches, json!("^file_[a-z]+$"));
    assert!(condition.evaluate(Some(&params(&[("name", json!("file_read"))]))));
    assert!(!condition.evaluate(Some(&params(&[("name", json!("FILE_READ"))]))));
    assert!(!condition.evaluate(Some(&params(&[("name", json!(7))]))));

    let bad_regex = Condition::new().with("name", ConditionOperator::Matches, json!("(unclosed"));
    assert!(!bad_regex.evaluate(Some(&params(&[("name", json!("anything"))]))));
}

// ============================================================================
// SECTION: Conjunction and Fail-Secure Edges
// ============================================================================

/// Tests an empty condition is true and a missing map under a non-empty
/// condition is false.
#[test]
fn test_empty_and_missing_map() {
    let empty = Condition::new();
    assert!(empty.evaluate(None));
    assert!(empty.evaluate(Some(&params(&[]))));

    let non_empty = Condition::new().with("a", ConditionOperator::Equals, json!(1));
    assert!(!non_empty.evaluate(None));
}

/// Tests operators under one parameter and across parameters are conjunctive.
#[test]
fn test_conjunction_on_both_axes() {
    let condition = Condition::new()
        .with("path", ConditionOperator::StartsWith, json!("/tmp/"))
        .with("path", ConditionOperator::EndsWith, json!(".txt"))
        .with("size", ConditionOperator::Lt, json!(100));
    assert!(condition.evaluate(Some(&params(&[
        ("path", json!("/tmp/note.txt")),
        ("size", json!(12)),
    ]))));
    assert!(!condition.evaluate(Some(&params(&[
        ("path", json!("/tmp/note.log")),
        ("size", json!(12)),
    ]))));
    assert!(!condition.evaluate(Some(&params(&[
        ("path", json!("/tmp/note.txt")),
        ("size", json!(200)),
    ]))));
}

/// Tests unknown operators fail validation and evaluate to false.
#[test]
fn test_unknown_operator_rejected() {
    let raw = json!({"path": {"startsWith": "/tmp/", "regexMatch": "x"}});
    let condition: Condition = serde_json::from_value(raw).unwrap();
    assert!(condition.validate().is_err());
    assert!(!condition.evaluate(Some(&params(&[("path", json!("/tmp/a"))]))));
}

// ============================================================================
// SECTION: Regex Screening
// ============================================================================

/// Tests overlong patterns are rejected.
#[test]
fn test_pattern_length_limit() {
    assert!(is_safe_pattern(&"a".repeat(200)));
    assert!(!is_safe_pattern(&"a".repeat(201)));
}

/// Tests catastrophic-backtracking shapes are rejected.
#[test]
fn test_catastrophic_shapes_rejected() {
    assert!(!is_safe_pattern("(a+)+"));
    assert!(!is_safe_pattern("(x+x+)+y"));
    assert!(!is_safe_pattern("(.*)*b"));
    assert!(!is_safe_pattern("([a-z]+)*"));
    assert!(!is_safe_pattern("((ab)+)+"));
    assert!(is_safe_pattern("^file_[a-z]+$"));
    assert!(is_safe_pattern("(abc)+def"));
    assert!(is_safe_pattern("[a-z]+[0-9]*"));
}
