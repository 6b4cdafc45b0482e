// warden-core/src/runtime/mod.rs
// ============================================================================
// Module: Warden Runtime
// Description: Event bus, kill switch, engine, and orchestrator wiring.
// Purpose: Compose core types into the evaluate pipeline.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime layer holds everything with behavior: the policy engine, the
//! event bus, the kill switch, the approval coordinator, the in-memory
//! store, and the orchestrator that composes them.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod approval;
pub mod bus;
pub mod engine;
pub mod killswitch;
pub mod memory;
pub mod warden;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use approval::ApprovalCoordinator;
pub use approval::ApprovalOutcome;
pub use approval::DEFAULT_APPROVAL_TIMEOUT_SECS;
pub use bus::EventBus;
pub use bus::LISTENER_DEADLINE;
pub use bus::ListenerFuture;
pub use bus::ListenerId;
pub use engine::AppliedRule;
pub use engine::EvaluationRequest;
pub use engine::PolicyEngine;
pub use engine::PolicyEvaluation;
pub use killswitch::DEFAULT_RESET_REASON;
pub use killswitch::KillSwitch;
pub use killswitch::KillSwitchStatus;
pub use memory::InMemoryGovernanceStore;
pub use warden::Decision;
pub use warden::Warden;
pub use warden::WardenBuilder;
pub use warden::WardenConfig;
