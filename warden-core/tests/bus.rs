// warden-core/tests/bus.rs
// ============================================================================
// Module: Event Bus Tests
// Description: Validate non-blocking dispatch, isolation, and deadlines.
// ============================================================================
//! ## Overview
//! Exercises the dispatch boundary: emit returns before listeners run, a
//! panicking listener never starves its peers, listeners past the deadline
//! are abandoned but not cancelled, and the trace resolver is consulted
//! only by `emit`.

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
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use warden_core::EventBus;
use warden_core::EventData;
use warden_core::EventType;
use warden_core::GovernanceEvent;
use warden_core::TraceId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// SECTION: Dispatch Boundary
// ============================================================================

/// Tests emit returns before any listener executes.
#[tokio::test]
async fn test_emit_returns_before_listener_runs() {
    let bus = EventBus::new();
    let entered = Arc::new(AtomicBool::new(false));
    let observer = Arc::clone(&entered);
    bus.on(EventType::ToolCallAllowed, move |_event| {
        let observer = Arc::clone(&observer);
        Box::pin(async move {
            observer.store(true, Ordering::SeqCst);
        })
    });

    bus.emit(EventType::ToolCallAllowed, EventData::new());
    // The caller's stack has not unwound yet, so the listener cannot have run.
    assert!(!entered.load(Ordering::SeqCst));

    settle().await;
    assert!(entered.load(Ordering::SeqCst));
}

/// Tests a panicking listener does not prevent its peers from running.
#[tokio::test]
async fn test_panicking_listener_isolated() {
    let bus = EventBus::new();
    let delivered = Arc::new(AtomicU32::new(0));

    bus.on(EventType::ToolCallDenied, |_event| {
        Box::pin(async move {
            panic!("listener failure");
        })
    });
    let counter = Arc::clone(&delivered);
    bus.on(EventType::ToolCallDenied, move |_event| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });

    bus.emit(EventType::ToolCallDenied, EventData::new());
    settle().await;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

/// Tests a listener past the deadline is abandoned but completes anyway.
#[tokio::test]
async fn test_slow_listener_abandoned_not_cancelled() {
    let bus = EventBus::new();
    let completed = Arc::new(AtomicBool::new(false));
    let observer = Arc::clone(&completed);
    bus.on(EventType::ToolCallAllowed, move |_event| {
        let observer = Arc::clone(&observer);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            observer.store(true, Ordering::SeqCst);
        })
    });

    bus.emit(EventType::ToolCallAllowed, EventData::new());
    tokio::time::sleep(Duration::from_millis(120)).await;
    // Past the 100 ms deadline the bus stopped awaiting, but the listener
    // itself keeps running to completion.
    assert!(!completed.load(Ordering::SeqCst));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(completed.load(Ordering::SeqCst));
}

/// Tests emission of one type never triggers listeners of another.
#[tokio::test]
async fn test_type_isolation() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&count);
    bus.on(EventType::PolicyCreated, move |_event| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });

    bus.emit(EventType::PolicyDeleted, EventData::new());
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Tests off removes exactly the addressed listener, idempotently.
#[tokio::test]
async fn test_off_and_remove_all() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&count);
    let id = bus.on(EventType::AgentStarted, move |_event| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });

    assert!(bus.off(EventType::AgentStarted, id));
    assert!(!bus.off(EventType::AgentStarted, id));

    bus.emit(EventType::AgentStarted, EventData::new());
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let counter = Arc::clone(&count);
    bus.on(EventType::AgentStarted, move |_event| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });
    bus.remove_all(None);
    bus.emit(EventType::AgentStarted, EventData::new());
    settle().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

// ============================================================================
// SECTION: Trace Resolver
// ============================================================================

/// Tests emit consults the resolver once and attaches the trace id.
#[tokio::test]
async fn test_resolver_consulted_once_per_emit() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));
    let trace_id = TraceId::generate();

    let counter = Arc::clone(&calls);
    let resolved = trace_id.clone();
    bus.set_trace_resolver(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Some(resolved.clone())
    });

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    bus.on(EventType::ToolCallAllowed, move |event| {
        let sender = sender.clone();
        Box::pin(async move {
            let _ = sender.send(event);
        })
    });

    bus.emit(EventType::ToolCallAllowed, EventData::new());
    let event = receiver.recv().await.unwrap();
    assert_eq!(event.trace_id, Some(trace_id));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Tests emit_event bypasses the resolver.
#[tokio::test]
async fn test_emit_event_skips_resolver() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    bus.set_trace_resolver(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    bus.on(EventType::ToolCallDenied, move |event| {
        let sender = sender.clone();
        Box::pin(async move {
            let _ = sender.send(event);
        })
    });

    let explicit = TraceId::generate();
    let event =
        GovernanceEvent::new(EventType::ToolCallDenied, EventData::new()).with_trace_id(explicit.clone());
    bus.emit_event(event);

    let received = receiver.recv().await.unwrap();
    assert_eq!(received.trace_id, Some(explicit));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Tests a panicking resolver degrades to an absent trace id.
#[tokio::test]
async fn test_resolver_panic_suppressed() {
    let bus = EventBus::new();
    bus.set_trace_resolver(|| panic!("resolver failure"));

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    bus.on(EventType::ToolCallAllowed, move |event| {
        let sender = sender.clone();
        Box::pin(async move {
            let _ = sender.send(event);
        })
    });

    bus.emit(EventType::ToolCallAllowed, EventData::new());
    let event = receiver.recv().await.unwrap();
    assert_eq!(event.trace_id, None);
}
