// warden-core/src/runtime/killswitch.rs
// ============================================================================
// Module: Kill Switch
// Description: Tenant-scoped circuit breaker with idempotent activation.
// Purpose: Short-circuit evaluation deterministically during incidents.
// Dependencies: serde, crate::core, crate::runtime::bus
// ============================================================================

//! ## Overview
//! The kill switch holds one global state record and one record per tenant.
//! The tiers are strictly independent: activating or resetting one never
//! touches the other. Activation is first-write-wins: the write path checks
//! `active` before mutating, so a second activation changes nothing and
//! emits nothing. Activation is linearized against every subsequent
//! `is_active` query through a single internal lock; the critical sections
//! are O(1).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

use crate::core::EventData;
use crate::core::EventType;
use crate::core::GovernanceEvent;
use crate::core::TenantId;
use crate::core::Timestamp;
use crate::runtime::bus::EventBus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reset reason recorded when the caller supplies none.
pub const DEFAULT_RESET_REASON: &str = "Manual reset";

// ============================================================================
// SECTION: Status
// ============================================================================

/// Observable state of one kill-switch scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSwitchStatus {
    /// True while the scope is tripped.
    pub active: bool,
    /// RFC 3339 activation instant while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<String>,
    /// Activation reason while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Mutable kill-switch state behind the lock.
#[derive(Debug, Default)]
struct KillSwitchState {
    /// Global scope.
    global: KillSwitchStatus,
    /// Per-tenant scopes.
    tenants: BTreeMap<TenantId, KillSwitchStatus>,
}

impl KillSwitchState {
    /// Returns the status for a scope, defaulting to inactive.
    fn scope(&self, tenant_id: Option<&TenantId>) -> KillSwitchStatus {
        match tenant_id {
            None => self.global.clone(),
            Some(tenant_id) => self.tenants.get(tenant_id).cloned().unwrap_or_default(),
        }
    }

    /// Returns a mutable reference to the status for a scope.
    fn scope_mut(&mut self, tenant_id: Option<&TenantId>) -> &mut KillSwitchStatus {
        match tenant_id {
            None => &mut self.global,
            Some(tenant_id) => self.tenants.entry(tenant_id.clone()).or_default(),
        }
    }
}

// ============================================================================
// SECTION: Kill Switch
// ============================================================================

/// Two-tier circuit breaker consulted on every evaluation.
pub struct KillSwitch {
    /// Shared state for both tiers.
    state: Mutex<KillSwitchState>,
    /// Optional bus for activation and reset events.
    bus: Option<Arc<EventBus>>,
}

impl KillSwitch {
    /// Creates a kill switch without event emission.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(KillSwitchState::default()),
            bus: None,
        }
    }

    /// Creates a kill switch that emits activation and reset events.
    #[must_use]
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(KillSwitchState::default()),
            bus: Some(bus),
        }
    }

    /// Activates a scope; idempotent while already active.
    pub fn activate(&self, reason: &str, tenant_id: Option<&TenantId>) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let scope = guard.scope_mut(tenant_id);
        if scope.active {
            return;
        }
        *scope = KillSwitchStatus {
            active: true,
            activated_at: Some(Timestamp::now().to_rfc3339()),
            reason: Some(reason.to_string()),
        };
        drop(guard);
        self.emit(EventType::KillSwitchActivated, tenant_id, |data| {
            data.insert("reason".to_string(), Value::String(reason.to_string()));
        });
    }

    /// Resets a scope; idempotent while inactive.
    ///
    /// The reset reason defaults to [`DEFAULT_RESET_REASON`] and the event
    /// preserves the previous activation reason.
    pub fn reset(&self, tenant_id: Option<&TenantId>, reason: Option<&str>) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let scope = guard.scope_mut(tenant_id);
        if !scope.active {
            return;
        }
        let previous_reason = scope.reason.take();
        *scope = KillSwitchStatus::default();
        drop(guard);
        let reset_reason = reason.unwrap_or(DEFAULT_RESET_REASON).to_string();
        self.emit(EventType::KillSwitchDeactivated, tenant_id, |data| {
            data.insert("reason".to_string(), Value::String(reset_reason.clone()));
            if let Some(previous) = previous_reason.clone() {
                data.insert("previousReason".to_string(), Value::String(previous));
            }
        });
    }

    /// Returns true while the scope is tripped.
    ///
    /// A poisoned lock reads as active: when state is unobservable the
    /// breaker fails closed.
    #[must_use]
    pub fn is_active(&self, tenant_id: Option<&TenantId>) -> bool {
        self.state.lock().map_or(true, |guard| guard.scope(tenant_id).active)
    }

    /// Returns the observable status of a scope.
    #[must_use]
    pub fn status(&self, tenant_id: Option<&TenantId>) -> KillSwitchStatus {
        self.state.lock().map_or_else(
            |_| KillSwitchStatus {
                active: true,
                activated_at: None,
                reason: Some("kill switch state unobservable".to_string()),
            },
            |guard| guard.scope(tenant_id),
        )
    }

    /// Emits a kill-switch event when a bus is attached.
    fn emit(
        &self,
        event_type: EventType,
        tenant_id: Option<&TenantId>,
        fill: impl FnOnce(&mut EventData),
    ) {
        let Some(bus) = &self.bus else {
            return;
        };
        let mut data = EventData::new();
        fill(&mut data);
        if let Some(tenant_id) = tenant_id {
            data.insert("tenantId".to_string(), Value::String(tenant_id.as_str().to_string()));
        }
        let mut event = GovernanceEvent::new(event_type, data);
        event.tenant_id = tenant_id.cloned();
        bus.emit_event(event);
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}
