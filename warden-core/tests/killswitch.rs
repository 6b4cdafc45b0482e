// warden-core/tests/killswitch.rs
// ============================================================================
// Module: Kill Switch Tests
// Description: Validate idempotent activation and tenant isolation.
// ============================================================================
//! ## Overview
//! Exercises first-write-wins activation, scope independence between the
//! global and tenant tiers, reset reason handling, and event emission.

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

use std::sync::Arc;

use serde_json::Value;
use warden_core::DEFAULT_RESET_REASON;
use warden_core::EventBus;
use warden_core::EventType;
use warden_core::GovernanceEvent;
use warden_core::KillSwitch;
use warden_core::TenantId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn bus_with_sink(
    event_type: EventType,
) -> (Arc<EventBus>, tokio::sync::mpsc::UnboundedReceiver<GovernanceEvent>) {
    let bus = Arc::new(EventBus::new());
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    bus.on(event_type, move |event| {
        let sender = sender.clone();
        Box::pin(async move {
            let _ = sender.send(event);
        })
    });
    (bus, receiver)
}

// ============================================================================
// SECTION: Activation
// ============================================================================

/// Tests activation records the reason and an activation instant.
#[test]
fn test_activate_records_state() {
    let switch = KillSwitch::new();
    assert!(!switch.is_active(None));

    switch.activate("incident drill", None);
    assert!(switch.is_active(None));
    let status = switch.status(None);
    assert!(status.active);
    assert_eq!(status.reason.as_deref(), Some("incident drill"));
    assert!(status.activated_at.is_some());
}

/// Tests a second activation changes nothing and emits nothing.
#[tokio::test]
async fn test_activation_idempotent() {
    let (bus, mut events) = bus_with_sink(EventType::KillSwitchActivated);
    let switch = KillSwitch::with_bus(bus);

    switch.activate("first", None);
    let first = events.recv().await.unwrap();
    assert_eq!(first.data.get("reason"), Some(&Value::String("first".to_string())));
    let before = switch.status(None);

    switch.activate("second", None);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(switch.status(None), before);
    assert!(events.try_recv().is_err());
}

// ============================================================================
// SECTION: Tenant Isolation
// ============================================================================

/// Tests activating one scope leaves every other scope untouched.
#[test]
fn test_tenant_isolation() {
    let switch = KillSwitch::new();
    let tenant_a = TenantId::new("tenant-a");
    let tenant_b = TenantId::new("tenant-b");

    switch.activate("a only", Some(&tenant_a));
    assert!(switch.is_active(Some(&tenant_a)));
    assert!(!switch.is_active(Some(&tenant_b)));
    assert!(!switch.is_active(None));

    switch.activate("global", None);
    assert!(switch.is_active(None));
    assert!(!switch.is_active(Some(&tenant_b)));

    switch.reset(None, None);
    assert!(!switch.is_active(None));
    assert!(switch.is_active(Some(&tenant_a)));
}

// ============================================================================
// SECTION: Reset
// ============================================================================

/// Tests reset clears state and preserves the previous reason on the event.
#[tokio::test]
async fn test_reset_emits_previous_reason() {
    let (bus, mut events) = bus_with_sink(EventType::KillSwitchDeactivated);
    let switch = KillSwitch::with_bus(bus);

    switch.activate("maintenance", None);
    switch.reset(None, Some("maintenance complete"));

    let event = events.recv().await.unwrap();
    assert_eq!(
        event.data.get("reason"),
        Some(&Value::String("maintenance complete".to_string()))
    );
    assert_eq!(
        event.data.get("previousReason"),
        Some(&Value::String("maintenance".to_string()))
    );
    assert!(!switch.is_active(None));
}

/// Tests reset defaults its reason and is idempotent while inactive.
#[tokio::test]
async fn test_reset_default_reason_and_idempotence() {
    let (bus, mut events) = bus_with_sink(EventType::KillSwitchDeactivated);
    let switch = KillSwitch::with_bus(bus);

    switch.reset(None, None);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());

    switch.activate("drill", None);
    switch.reset(None, None);
    let event = events.recv().await.unwrap();
    assert_eq!(
        event.data.get("reason"),
        Some(&Value::String(DEFAULT_RESET_REASON.to_string()))
    );
}

/// Tests tenant activation events carry the tenant id.
#[tokio::test]
async fn test_tenant_event_carries_scope() {
    let (bus, mut events) = bus_with_sink(EventType::KillSwitchActivated);
    let switch = KillSwitch::with_bus(bus);
    let tenant = TenantId::new("tenant-x");

    switch.activate("scoped", Some(&tenant));
    let event = events.recv().await.unwrap();
    assert_eq!(event.tenant_id, Some(tenant));
    assert_eq!(event.data.get("tenantId"), Some(&Value::String("tenant-x".to_string())));
}
