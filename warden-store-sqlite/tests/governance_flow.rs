// warden-store-sqlite/tests/governance_flow.rs
// ============================================================================
// Module: Governance Flow Tests
// Description: End-to-end orchestrator scenarios over the durable store.
// ============================================================================
//! ## Overview
//! Drives the full pipeline against `SQLite`: decision events with durable
//! audit rows, kill-switch domination, approval interception with lazy
//! timeout, and integrity-violation signaling after tampering.

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
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;
use warden_core::ApprovalDecision;
use warden_core::ApprovalResolution;
use warden_core::ApprovalStatus;
use warden_core::AuditResult;
use warden_core::Effect;
use warden_core::EvaluationRequest;
use warden_core::EventType;
use warden_core::FailureCategory;
use warden_core::GovernanceEvent;
use warden_core::Policy;
use warden_core::PolicyName;
use warden_core::PolicyRule;
use warden_core::ToolPattern;
use warden_core::Warden;
use warden_core::WardenConfig;
use warden_core::interfaces::AuditQuery;
use warden_core::interfaces::GovernanceStore;
use warden_store_sqlite::SqliteGovernanceStore;
use warden_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn durable_warden(dir: &TempDir, policy: Policy) -> (Warden, std::path::PathBuf) {
    let path = dir.path().join("warden.db");
    let store = SqliteGovernanceStore::open(&SqliteStoreConfig::new(&path)).unwrap();
    let warden = Warden::builder().store(Arc::new(store)).policy(policy).build();
    (warden, path)
}

fn sink(
    warden: &Warden,
    event_type: EventType,
) -> tokio::sync::mpsc::UnboundedReceiver<GovernanceEvent> {
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    warden.bus().on(event_type, move |event| {
        let sender = sender.clone();
        Box::pin(async move {
            let _ = sender.send(event);
        })
    });
    receiver
}

// ============================================================================
// SECTION: Decision Scenarios
// ============================================================================

/// Tests an allow decision lands durably with a verifiable chain.
#[tokio::test(flavor = "multi_thread")]
async fn test_allow_flow_durable() {
    let dir = TempDir::new().unwrap();
    let policy = Policy::new(
        PolicyName::new("p"),
        vec![PolicyRule::new(ToolPattern::new("file_read"), Effect::Allow)],
    );
    let (warden, _path) = durable_warden(&dir, policy);
    let mut allowed_events = sink(&warden, EventType::ToolCallAllowed);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "file_read")).unwrap();
    assert!(decision.allowed);
    let _ = allowed_events.recv().await.unwrap();

    let page = warden.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Allowed);
    assert!(warden.verify_audit_chain().unwrap().valid);
}

/// Tests kill-switch denials append durable rows naming the switch.
#[tokio::test(flavor = "multi_thread")]
async fn test_kill_switch_flow_durable() {
    let dir = TempDir::new().unwrap();
    let (warden, _path) = durable_warden(&dir, Policy::default_allow_all());
    let mut denied_events = sink(&warden, EventType::ToolCallDenied);

    warden.kill_switch().activate("drill", None);
    let decision = warden.evaluate(&EvaluationRequest::new("a", "anything")).unwrap();
    assert!(!decision.allowed);

    let event = denied_events.recv().await.unwrap();
    assert_eq!(event.data.get("killSwitch"), Some(&Value::Bool(true)));

    let page = warden.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert!(page.records[0].reason.as_deref().unwrap().contains("Kill-Switch"));

    warden.kill_switch().reset(None, None);
    let decision = warden.evaluate(&EvaluationRequest::new("a", "anything")).unwrap();
    assert!(decision.allowed);
}

// ============================================================================
// SECTION: Approval Scenarios
// ============================================================================

/// Tests interception, durable pending state, and explicit resolution.
#[tokio::test(flavor = "multi_thread")]
async fn test_approval_flow_durable() {
    let dir = TempDir::new().unwrap();
    let rule =
        PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let (warden, _path) = durable_warden(&dir, Policy::new(PolicyName::new("p"), vec![rule]));
    let mut requested_events = sink(&warden, EventType::ApprovalRequested);
    let mut granted_events = sink(&warden, EventType::ApprovalGranted);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    assert!(!decision.allowed);
    assert!(decision.requires_approval);
    let approval_id = decision.approval_id.unwrap();
    let _ = requested_events.recv().await.unwrap();

    // The decision is in abeyance until resolution.
    assert_eq!(warden.query_audit(&AuditQuery::default()).unwrap().total, 0);

    let outcome = warden
        .resolve_approval(
            approval_id,
            ApprovalResolution::new(ApprovalDecision::Approved).by("alice"),
        )
        .unwrap();
    assert!(outcome.resolved);
    let _ = granted_events.recv().await.unwrap();

    let page = warden.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Allowed);
    assert!(warden.verify_audit_chain().unwrap().valid);
}

/// Tests an unobserved expired approval materializes on listing.
#[tokio::test(flavor = "multi_thread")]
async fn test_lazy_timeout_flow_durable() {
    let dir = TempDir::new().unwrap();
    let rule =
        PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let path = dir.path().join("warden.db");
    let store = SqliteGovernanceStore::open(&SqliteStoreConfig::new(&path)).unwrap();
    let warden = Warden::builder()
        .store(Arc::new(store))
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .config(WardenConfig {
            approval_timeout_secs: 0,
        })
        .build();
    let mut timeout_events = sink(&warden, EventType::ApprovalTimeout);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    let approval_id = decision.approval_id.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let listed = warden
        .list_approval_requests(&warden_core::interfaces::ApprovalFilter::default())
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ApprovalStatus::Timeout);
    assert_eq!(listed[0].id, approval_id);

    let event = timeout_events.recv().await.unwrap();
    assert_eq!(event.data.get("approvalId"), Some(&Value::from(approval_id)));

    let page = warden.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Denied);
    assert_eq!(page.records[0].failure_category, Some(FailureCategory::ApprovalTimeout));
}

// ============================================================================
// SECTION: Integrity Signaling
// ============================================================================

/// Tests verification emits `audit.integrity_violation` after tampering.
#[tokio::test(flavor = "multi_thread")]
async fn test_integrity_violation_event() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("warden.db");
    let store = SqliteGovernanceStore::open(&SqliteStoreConfig::new(&path)).unwrap();
    for tool in ["a", "b", "c"] {
        store
            .write_audit(warden_core::NewAuditRecord::new(
                warden_core::TraceId::generate(),
                warden_core::AgentId::new("agent-1"),
                tool,
                AuditResult::Allowed,
            ))
            .unwrap();
    }

    let raw = Connection::open(&path).unwrap();
    raw.execute_batch("DROP TRIGGER trg_audit_log_no_update;").unwrap();
    raw.execute("UPDATE audit_log SET hash = ?1 WHERE id = 2", params!["deadbeef".repeat(8)])
        .unwrap();
    drop(raw);

    let warden = Warden::builder().store(Arc::new(store)).build();
    let mut violation_events = sink(&warden, EventType::AuditIntegrityViolation);

    let verification = warden.verify_audit_chain().unwrap();
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(2));

    let event = violation_events.recv().await.unwrap();
    assert_eq!(event.data.get("brokenAt"), Some(&Value::from(2)));
    assert_eq!(event.data.get("verifiedEvents"), Some(&Value::from(1u64)));
}
