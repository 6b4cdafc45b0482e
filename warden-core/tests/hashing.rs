// warden-core/tests/hashing.rs
// ============================================================================
// Module: Hash Chain Tests
// Description: Validate canonical record hashing and chain verification.
// ============================================================================
//! ## Overview
//! Exercises hash determinism, record verification, chain walking, and
//! first-break localization over tampered records.

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
use warden_core::AgentId;
use warden_core::AuditRecord;
use warden_core::AuditResult;
use warden_core::NewAuditRecord;
use warden_core::ParameterMap;
use warden_core::TraceId;
use warden_core::core::hashing::GENESIS_MARKER;
use warden_core::core::hashing::canonical_parameters;
use warden_core::core::hashing::chain_marker;
use warden_core::core::hashing::compute_hash;
use warden_core::core::hashing::verify_chain;
use warden_core::core::hashing::verify_record;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn sample_record(tool: &str) -> NewAuditRecord {
    let mut record = NewAuditRecord::new(
        TraceId::generate(),
        AgentId::new("agent-1"),
        tool,
        AuditResult::Allowed,
    );
    record.duration_ms = 3;
    record
}

fn chain_of(tools: &[&str]) -> Vec<AuditRecord> {
    let mut records = Vec::new();
    let mut previous: Option<String> = None;
    for (index, tool) in tools.iter().enumerate() {
        let fresh = sample_record(tool);
        let hash = compute_hash(&(&fresh).into(), previous.as_deref()).unwrap();
        let record = fresh.into_record(index as i64 + 1, previous.clone(), hash.clone());
        previous = Some(hash);
        records.push(record);
    }
    records
}

// ============================================================================
// SECTION: Hash Computation
// ============================================================================

/// Tests hashing is deterministic and shaped as 64 lowercase hex.
#[test]
fn test_hash_deterministic_and_well_formed() {
    let record = sample_record("file_read");
    let first = compute_hash(&(&record).into(), None).unwrap();
    let second = compute_hash(&(&record).into(), None).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
}

/// Tests the genesis marker is structurally distinct from chained markers.
#[test]
fn test_chain_marker_forms() {
    assert_eq!(chain_marker(None), GENESIS_MARKER);
    let chained = chain_marker(Some("ab".repeat(32).as_str()));
    assert!(chained.starts_with("CHAIN:"));
    assert_ne!(chained, GENESIS_MARKER);
}

/// Tests the predecessor hash changes the digest.
#[test]
fn test_previous_hash_feeds_digest() {
    let record = sample_record("file_read");
    let genesis = compute_hash(&(&record).into(), None).unwrap();
    let chained = compute_hash(&(&record).into(), Some(&"a".repeat(64))).unwrap();
    assert_ne!(genesis, chained);
}

/// Tests parameter canonicalization ignores key insertion order.
#[test]
fn test_canonical_parameters_sorted() {
    let mut forward = ParameterMap::new();
    forward.insert("alpha".to_string(), json!(1));
    forward.insert("beta".to_string(), json!(2));
    let mut reverse = ParameterMap::new();
    reverse.insert("beta".to_string(), json!(2));
    reverse.insert("alpha".to_string(), json!(1));

    assert_eq!(
        canonical_parameters(Some(&forward)).unwrap(),
        canonical_parameters(Some(&reverse)).unwrap()
    );
    assert_eq!(canonical_parameters(None).unwrap(), "");
}

// ============================================================================
// SECTION: Record Verification
// ============================================================================

/// Tests verify_record accepts intact records and rejects tampering.
#[test]
fn test_verify_record() {
    let mut records = chain_of(&["file_read"]);
    assert!(verify_record(&records[0]));

    records[0].reason = Some("altered".to_string());
    assert!(!verify_record(&records[0]));
}

/// Tests a hash of the wrong length is rejected without panicking.
#[test]
fn test_verify_record_length_mismatch() {
    let mut records = chain_of(&["file_read"]);
    records[0].hash = "deadbeef".to_string();
    assert!(!verify_record(&records[0]));
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Tests a clean chain verifies fully.
#[test]
fn test_chain_verifies_clean() {
    let records = chain_of(&["a", "b", "c", "d"]);
    let verification = verify_chain(&records);
    assert!(verification.valid);
    assert_eq!(verification.broken_at, None);
    assert_eq!(verification.total_events, 4);
    assert_eq!(verification.verified_events, 4);
}

/// Tests replacing the second record's hash localizes the break.
#[test]
fn test_chain_break_localization() {
    let mut records = chain_of(&["a", "b", "c"]);
    records[1].hash = "deadbeef".repeat(8);
    let verification = verify_chain(&records);
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(2));
    assert_eq!(verification.total_events, 3);
    assert_eq!(verification.verified_events, 1);
}

/// Tests a broken predecessor link is detected at the linking record.
#[test]
fn test_chain_broken_link() {
    let mut records = chain_of(&["a", "b", "c"]);
    records[2].previous_hash = Some("f".repeat(64));
    let verification = verify_chain(&records);
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(3));
    assert_eq!(verification.verified_events, 2);
}

/// Tests the empty chain verifies trivially.
#[test]
fn test_empty_chain() {
    let verification = verify_chain(&[]);
    assert!(verification.valid);
    assert_eq!(verification.total_events, 0);
}
