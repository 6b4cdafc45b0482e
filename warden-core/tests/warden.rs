// warden-core/tests/warden.rs
// ============================================================================
// Module: Orchestrator Tests
// Description: Validate the evaluate pipeline over the in-memory store.
// ============================================================================
//! ## Overview
//! End-to-end coverage of the evaluate pipeline: decision events, audit
//! rows, kill-switch short-circuits, approval interception, fail-secure
//! policy resolution, and tenant scoping. A faulty-store wrapper exercises
//! the degradation paths.

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

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use warden_core::AgentConfig;
use warden_core::AgentId;
use warden_core::AgentStatus;
use warden_core::ApprovalDecision;
use warden_core::ApprovalRequest;
use warden_core::ApprovalResolution;
use warden_core::ApprovalStatus;
use warden_core::AuditResult;
use warden_core::ChainVerification;
use warden_core::Effect;
use warden_core::ErrorCode;
use warden_core::EvaluationRequest;
use warden_core::EventType;
use warden_core::FailureCategory;
use warden_core::GovernanceEvent;
use warden_core::InMemoryGovernanceStore;
use warden_core::NewApprovalRequest;
use warden_core::NewAuditRecord;
use warden_core::ParameterMap;
use warden_core::Policy;
use warden_core::PolicyName;
use warden_core::PolicyRule;
use warden_core::PolicyVersion;
use warden_core::TenantId;
use warden_core::Timestamp;
use warden_core::ToolPattern;
use warden_core::Warden;
use warden_core::WardenConfig;
use warden_core::interfaces::ApprovalFilter;
use warden_core::interfaces::ApprovalStore;
use warden_core::interfaces::AuditPage;
use warden_core::interfaces::AuditQuery;
use warden_core::interfaces::GovernanceStore;
use warden_core::interfaces::PolicyUpsert;
use warden_core::interfaces::StoreError;

// ============================================================================
// SECTION: Faulty Store Wrapper
// ============================================================================

/// Store wrapper with switchable failure modes for degradation tests.
#[derive(Clone, Default)]
struct FaultyStore {
    inner: InMemoryGovernanceStore,
    fail_audit_writes: Arc<AtomicBool>,
    fail_policy_resolve: Arc<AtomicBool>,
    hide_approvals: Arc<AtomicBool>,
    resolve_calls: Arc<AtomicU32>,
}

impl GovernanceStore for FaultyStore {
    fn write_audit(&self, record: NewAuditRecord) -> Result<warden_core::AuditRecord, StoreError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Db("disk full".to_string()));
        }
        self.inner.write_audit(record)
    }

    fn query_audit(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        self.inner.query_audit(query)
    }

    fn latest_audit_hash(&self) -> Result<Option<String>, StoreError> {
        self.inner.latest_audit_hash()
    }

    fn verify_audit_chain(&self) -> Result<ChainVerification, StoreError> {
        self.inner.verify_audit_chain()
    }

    fn export_audit(&self, query: &AuditQuery, out: &mut dyn Write) -> Result<u64, StoreError> {
        self.inner.export_audit(query, out)
    }

    fn upsert_policy(&self, policy: &Policy, author: &str) -> Result<PolicyUpsert, StoreError> {
        self.inner.upsert_policy(policy, author)
    }

    fn get_policy(&self, name: &PolicyName) -> Result<Option<Policy>, StoreError> {
        self.inner.get_policy(name)
    }

    fn list_policies(&self) -> Result<Vec<Policy>, StoreError> {
        self.inner.list_policies()
    }

    fn delete_policy(&self, name: &PolicyName) -> Result<bool, StoreError> {
        self.inner.delete_policy(name)
    }

    fn resolve_active_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_policy_resolve.load(Ordering::SeqCst) {
            return Err(StoreError::Db("connection lost".to_string()));
        }
        self.inner.resolve_active_policy(agent_id)
    }

    fn policy_history(&self, name: &PolicyName) -> Result<Vec<PolicyVersion>, StoreError> {
        self.inner.policy_history(name)
    }

    fn policy_version(&self, id: i64) -> Result<Option<PolicyVersion>, StoreError> {
        self.inner.policy_version(id)
    }

    fn register_agent(&self, config: &AgentConfig) -> Result<(), StoreError> {
        self.inner.register_agent(config)
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<AgentConfig>, StoreError> {
        self.inner.get_agent(agent_id)
    }

    fn update_agent_status(
        &self,
        agent_id: &AgentId,
        status: AgentStatus,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        self.inner.update_agent_status(agent_id, status, at)
    }

    fn list_agents(&self) -> Result<Vec<AgentConfig>, StoreError> {
        self.inner.list_agents()
    }

    fn delete_agent(&self, agent_id: &AgentId) -> Result<bool, StoreError> {
        self.inner.delete_agent(agent_id)
    }

    fn approvals(&self) -> Option<&dyn ApprovalStore> {
        if self.hide_approvals.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.approvals()
    }

    fn apply_migrations(&self) -> Result<u32, StoreError> {
        self.inner.apply_migrations()
    }

    fn schema_version(&self) -> Result<u32, StoreError> {
        self.inner.schema_version()
    }
}

impl ApprovalStore for FaultyStore {
    fn create_approval(
        &self,
        request: NewApprovalRequest,
    ) -> Result<ApprovalRequest, StoreError> {
        self.inner.create_approval(request)
    }

    fn get_approval(&self, id: i64) -> Result<Option<ApprovalRequest>, StoreError> {
        self.inner.get_approval(id)
    }

    fn list_approvals(&self, filter: &ApprovalFilter) -> Result<Vec<ApprovalRequest>, StoreError> {
        self.inner.list_approvals(filter)
    }

    fn resolve_approval(
        &self,
        id: i64,
        resolution: &ApprovalResolution,
        now: Timestamp,
    ) -> Result<Option<ApprovalRequest>, StoreError> {
        self.inner.resolve_approval(id, resolution, now)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn allow_rule(tool: &str) -> PolicyRule {
    PolicyRule::new(ToolPattern::new(tool), Effect::Allow)
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

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// SECTION: Allow and Deny Paths
// ============================================================================

/// Tests an exact allow produces the event and one clean audit record.
#[tokio::test]
async fn test_allow_on_exact_match() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![allow_rule("file_read")]))
        .build();
    let mut allowed_events = sink(&warden, EventType::ToolCallAllowed);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "file_read")).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.applied_rules.len(), 1);
    assert_eq!(decision.applied_rules[0].effect, Effect::Allow);
    assert!(!decision.requires_approval);

    let event = allowed_events.recv().await.unwrap();
    assert_eq!(event.trace_id, Some(decision.trace_id.clone()));
    assert!(event.data.contains_key("appliedRules"));

    let page = store.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Allowed);
    assert_eq!(page.records[0].failure_category, None);
    assert_eq!(page.records[0].trace_id, decision.trace_id);
}

/// Tests a deny carries its reason, category, and event.
#[tokio::test]
async fn test_deny_records_category() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let rule = PolicyRule::new(ToolPattern::new("shell"), Effect::Deny).because("No shells");
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .build();
    let mut denied_events = sink(&warden, EventType::ToolCallDenied);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "shell")).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason.as_deref(), Some("No shells"));

    let event = denied_events.recv().await.unwrap();
    assert_eq!(event.data.get("reason"), Some(&Value::String("No shells".to_string())));

    let page = store.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.records[0].result, AuditResult::Denied);
    assert_eq!(page.records[0].failure_category, Some(FailureCategory::PolicyDenial));
}

/// Tests the zero-configuration path allows through the synthetic policy.
#[tokio::test]
async fn test_zero_config_default_allow() {
    let warden = Warden::new();
    let decision = warden.evaluate(&EvaluationRequest::new("a", "anything")).unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.applied_rules.len(), 1);
    assert!(decision.applied_rules[0].tool.is_wildcard());
}

/// Tests a caller-supplied trace id is reused and determinism holds.
#[tokio::test]
async fn test_supplied_trace_reused_and_deterministic() {
    let warden = Warden::builder()
        .policy(Policy::new(PolicyName::new("p"), vec![allow_rule("file_read")]))
        .build();
    let trace = "00000000000000000000000000000abc";
    let request = EvaluationRequest::new("a", "file_read").with_trace_id(trace);

    let first = warden.evaluate(&request).unwrap();
    let second = warden.evaluate(&request).unwrap();
    assert_eq!(first.trace_id.as_str(), trace);
    assert_eq!(first.allowed, second.allowed);
    assert_eq!(first.reason, second.reason);
    assert_eq!(first.applied_rules, second.applied_rules);
}

/// Tests input validation raises `INVALID_REQUEST` without side effects.
#[tokio::test]
async fn test_validation_raises_invalid_request() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let warden = Warden::builder().store(store.clone()).build();

    let error = warden.evaluate(&EvaluationRequest::new("", "tool")).unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidRequest);
    let error = warden.evaluate(&EvaluationRequest::new("a", "  ")).unwrap_err();
    assert_eq!(error.code, ErrorCode::InvalidRequest);

    assert_eq!(store.query_audit(&AuditQuery::default()).unwrap().total, 0);
}

// ============================================================================
// SECTION: Kill Switch
// ============================================================================

/// Tests the kill switch dominates without consulting the policy layer.
#[tokio::test]
async fn test_kill_switch_dominates() {
    let store = FaultyStore::default();
    let warden = Warden::builder()
        .store(Arc::new(store.clone()))
        .policy(Policy::default_allow_all())
        .build();
    let mut denied_events = sink(&warden, EventType::ToolCallDenied);

    warden.kill_switch().activate("drill", None);
    let decision = warden.evaluate(&EvaluationRequest::new("a", "file_read")).unwrap();
    assert!(!decision.allowed);
    assert!(decision.reason.as_deref().unwrap().contains("Kill-Switch"));

    let event = denied_events.recv().await.unwrap();
    assert_eq!(event.data.get("killSwitch"), Some(&Value::Bool(true)));

    // The policy layer was never consulted.
    assert_eq!(store.resolve_calls.load(Ordering::SeqCst), 0);

    let page = store.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Denied);
}

// ============================================================================
// SECTION: Fail-Secure Resolution
// ============================================================================

/// Tests a persistence failure during resolution denies without an audit row.
#[tokio::test]
async fn test_policy_resolution_failure_fails_secure() {
    let store = FaultyStore::default();
    store.fail_policy_resolve.store(true, Ordering::SeqCst);
    let warden = Warden::builder().store(Arc::new(store.clone())).build();
    let mut denied_events = sink(&warden, EventType::ToolCallDenied);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "file_read")).unwrap();
    assert!(!decision.allowed);
    assert!(decision.reason.as_deref().unwrap().contains("fail-secure"));

    let _ = denied_events.recv().await.unwrap();
    store.fail_policy_resolve.store(false, Ordering::SeqCst);
    assert_eq!(store.query_audit(&AuditQuery::default()).unwrap().total, 0);
}

/// Tests a failed audit write leaves the decision intact and signals loss.
#[tokio::test]
async fn test_audit_write_failure_signalled() {
    let store = FaultyStore::default();
    store.fail_audit_writes.store(true, Ordering::SeqCst);
    let warden = Warden::builder()
        .store(Arc::new(store.clone()))
        .policy(Policy::default_allow_all())
        .build();
    let mut failure_events = sink(&warden, EventType::AuditWriteFailure);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "file_read")).unwrap();
    assert!(decision.allowed);

    let event = failure_events.recv().await.unwrap();
    assert_eq!(
        event.data.get("context"),
        Some(&Value::String("policy_evaluation".to_string()))
    );
}

// ============================================================================
// SECTION: Approval Interception
// ============================================================================

/// Tests an approval-gated allow diverts into a pending request.
#[tokio::test]
async fn test_approval_interception() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let rule = PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow)
        .named("gate")
        .requiring_approval();
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .build();
    let mut requested_events = sink(&warden, EventType::ApprovalRequested);
    let mut allowed_events = sink(&warden, EventType::ToolCallAllowed);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    assert!(!decision.allowed);
    assert!(decision.requires_approval);
    let approval_id = decision.approval_id.unwrap();
    assert!(decision.deadline.is_some());

    let event = requested_events.recv().await.unwrap();
    assert_eq!(event.data.get("approvalId"), Some(&Value::from(approval_id)));
    assert_eq!(event.data.get("ruleName"), Some(&Value::String("gate".to_string())));

    settle().await;
    assert!(allowed_events.try_recv().is_err());

    let pending = store.get_approval(approval_id).unwrap().unwrap();
    assert_eq!(pending.status, ApprovalStatus::Pending);
    // The decision is in abeyance: no audit row yet.
    assert_eq!(store.query_audit(&AuditQuery::default()).unwrap().total, 0);
}

/// Tests the approval path fails secure when the store lacks approvals.
#[tokio::test]
async fn test_approval_unavailable_fails_secure() {
    let store = FaultyStore::default();
    store.hide_approvals.store(true, Ordering::SeqCst);
    let rule = PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let warden = Warden::builder()
        .store(Arc::new(store.clone()))
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .build();
    let mut denied_events = sink(&warden, EventType::ToolCallDenied);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    assert!(!decision.allowed);
    assert!(decision.requires_approval);
    assert_eq!(decision.approval_id, None);
    assert_eq!(decision.reason.as_deref(), Some("approval infrastructure not available"));

    let _ = denied_events.recv().await.unwrap();
    // No audit write on this fallback path.
    assert_eq!(store.query_audit(&AuditQuery::default()).unwrap().total, 0);
}

/// Tests resolution emits the lifecycle event and audit row once.
#[tokio::test]
async fn test_approval_resolution() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let rule = PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .build();
    let mut granted_events = sink(&warden, EventType::ApprovalGranted);

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    let approval_id = decision.approval_id.unwrap();

    let outcome = warden
        .resolve_approval(
            approval_id,
            ApprovalResolution::new(ApprovalDecision::Approved).by("alice").with_comment("ok"),
        )
        .unwrap();
    assert!(outcome.resolved);
    assert_eq!(outcome.request.as_ref().unwrap().status, ApprovalStatus::Approved);

    let event = granted_events.recv().await.unwrap();
    assert_eq!(event.data.get("approver"), Some(&Value::String("alice".to_string())));

    let page = store.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Allowed);
    assert_eq!(page.records[0].trace_id, decision.trace_id);

    // A second resolution loses the optimistic update.
    let second = warden
        .resolve_approval(approval_id, ApprovalResolution::new(ApprovalDecision::Rejected))
        .unwrap();
    assert!(!second.resolved);
    assert_eq!(store.query_audit(&AuditQuery::default()).unwrap().total, 1);
}

/// Tests an expired pending request is observed as timeout.
#[tokio::test]
async fn test_lazy_timeout_on_get() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let rule = PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .config(WardenConfig {
            approval_timeout_secs: 0,
        })
        .build();

    let decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    let approval_id = decision.approval_id.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let observed = warden.get_approval_request(approval_id).unwrap().unwrap();
    assert_eq!(observed.status, ApprovalStatus::Timeout);

    let page = store.query_audit(&AuditQuery::default()).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].result, AuditResult::Denied);
    assert_eq!(page.records[0].failure_category, Some(FailureCategory::ApprovalTimeout));

    // Listing stays consistent after materialization.
    let listed = warden.list_approval_requests(&ApprovalFilter::default()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, ApprovalStatus::Timeout);
}

// ============================================================================
// SECTION: Tenant Scoping
// ============================================================================

/// Tests tenant-scoped evaluation stamps events and approval rows.
#[tokio::test]
async fn test_tenant_scoping() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let rule = PolicyRule::new(ToolPattern::new("dangerous"), Effect::Allow).requiring_approval();
    let warden = Warden::builder()
        .store(store.clone())
        .policy(Policy::new(PolicyName::new("p"), vec![rule]))
        .build();
    let tenant = TenantId::new("acme");
    let scoped = warden.for_tenant(tenant.clone());
    let mut requested_events = sink(&warden, EventType::ApprovalRequested);

    let decision = scoped.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    let approval_id = decision.approval_id.unwrap();

    let event = requested_events.recv().await.unwrap();
    assert_eq!(event.tenant_id, Some(tenant.clone()));
    assert_eq!(event.data.get("tenantId"), Some(&Value::String("acme".to_string())));

    let pending = scoped.get_approval_request(approval_id).unwrap().unwrap();
    assert_eq!(pending.tenant_id, Some(tenant.clone()));

    // The scoped kill switch leaves the parent unaffected.
    scoped.kill_switch().activate("tenant drill", Some(&tenant));
    let parent_decision = warden.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    assert!(parent_decision.requires_approval);
    let scoped_decision = scoped.evaluate(&EvaluationRequest::new("a", "dangerous")).unwrap();
    assert!(scoped_decision.reason.as_deref().unwrap().contains("Kill-Switch"));
}

/// Tests inline policies on a scoped orchestrator are isolated.
#[tokio::test]
async fn test_scoped_policy_isolated() {
    let warden = Warden::builder().policy(Policy::default_allow_all()).build();
    let scoped = warden.for_tenant(TenantId::new("acme"));

    let deny_all = Policy::new(
        PolicyName::new("deny-all"),
        vec![PolicyRule::new(ToolPattern::wildcard(), Effect::Deny).because("scoped lockdown")],
    );
    scoped.set_policy(deny_all).unwrap();

    let parent = warden.evaluate(&EvaluationRequest::new("a", "x")).unwrap();
    assert!(parent.allowed);
    let child = scoped.evaluate(&EvaluationRequest::new("a", "x")).unwrap();
    assert!(!child.allowed);
}

// ============================================================================
// SECTION: Administration
// ============================================================================

/// Tests agent registration and status writes emit lifecycle events.
#[tokio::test]
async fn test_agent_lifecycle_events() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let warden = Warden::builder().store(store.clone()).build();
    let mut config_events = sink(&warden, EventType::AgentConfigChanged);
    let mut started_events = sink(&warden, EventType::AgentStarted);

    let config = AgentConfig::new(AgentId::new("agent-1"), "Test Agent");
    warden.register_agent(&config).unwrap();
    let _ = config_events.recv().await.unwrap();

    warden.update_agent_status(&AgentId::new("agent-1"), AgentStatus::Running).unwrap();
    let event = started_events.recv().await.unwrap();
    assert_eq!(event.agent_id, Some(AgentId::new("agent-1")));

    let stored = warden.get_agent(&AgentId::new("agent-1")).unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Running);
    assert!(stored.last_active_at.is_some());

    let error = warden
        .update_agent_status(&AgentId::new("missing"), AgentStatus::Stopped)
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::AgentNotFound);
}

/// Tests policy persistence, history, and rollback.
#[tokio::test]
async fn test_policy_persistence_and_rollback() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let warden = Warden::builder().store(store.clone()).build();
    let name = PolicyName::new("workspace");

    let v1 = Policy::new(name.clone(), vec![allow_rule("file_read")]);
    let upsert = warden.save_policy(&v1, "alice").unwrap();
    assert!(upsert.created);

    let v2 = Policy::new(name.clone(), vec![allow_rule("file_read"), allow_rule("file_write")]);
    let upsert = warden.save_policy(&v2, "bob").unwrap();
    assert!(!upsert.created);
    assert_eq!(upsert.version, 2);

    let history = warden.policy_history(&name).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].version, 1);
    assert_eq!(history[0].rules.len(), 1);

    let restored = warden.rollback_policy(&name, history[0].id).unwrap();
    assert_eq!(restored.rules.len(), 1);

    let error = warden.rollback_policy(&name, 9999).unwrap_err();
    assert_eq!(error.code, ErrorCode::VersionNotFound);
}

/// Tests store-requiring operations fail with `DATABASE_REQUIRED`.
#[tokio::test]
async fn test_database_required() {
    let warden = Warden::new();
    let error = warden.list_policies().unwrap_err();
    assert_eq!(error.code, ErrorCode::DatabaseRequired);
    let error = warden.query_audit(&AuditQuery::default()).unwrap_err();
    assert_eq!(error.code, ErrorCode::DatabaseRequired);
    let error = warden.get_approval_request(1).unwrap_err();
    assert_eq!(error.code, ErrorCode::DatabaseRequired);
}

/// Tests NDJSON export streams one record per line.
#[tokio::test]
async fn test_export_ndjson() {
    let store = Arc::new(InMemoryGovernanceStore::new());
    let warden = Warden::builder().store(store).policy(Policy::default_allow_all()).build();
    warden.evaluate(&EvaluationRequest::new("a", "one")).unwrap();
    warden.evaluate(&EvaluationRequest::new("a", "two")).unwrap();

    let mut buffer = Vec::new();
    let written = warden.export_audit(&AuditQuery::default(), &mut buffer).unwrap();
    assert_eq!(written, 2);

    let text = String::from_utf8(buffer).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let value: Value = serde_json::from_str(line).unwrap();
        assert!(value.get("hash").is_some());
        assert!(value.get("previousHash").is_some() || value.get("hash").is_some());
    }
}

/// Tests evaluation honors parameter conditions end to end.
#[tokio::test]
async fn test_condition_path_end_to_end() {
    let condition = warden_core::Condition::new().with(
        "path",
        warden_core::ConditionOperator::StartsWith,
        json!("/etc/"),
    );
    let rules = vec![
        PolicyRule::new(ToolPattern::new("file_write"), Effect::Deny)
            .when(condition)
            .because("Forbidden path"),
        PolicyRule::new(ToolPattern::wildcard(), Effect::Allow),
    ];
    let warden =
        Warden::builder().policy(Policy::new(PolicyName::new("p"), rules)).build();

    let mut forbidden = ParameterMap::new();
    forbidden.insert("path".to_string(), json!("/etc/passwd"));
    let denied = warden
        .evaluate(&EvaluationRequest::new("a", "file_write").with_parameters(forbidden))
        .unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.reason.as_deref(), Some("Forbidden path"));

    let mut harmless = ParameterMap::new();
    harmless.insert("path".to_string(), json!("/tmp/x"));
    let allowed = warden
        .evaluate(&EvaluationRequest::new("a", "file_write").with_parameters(harmless))
        .unwrap();
    assert!(allowed.allowed);
}
