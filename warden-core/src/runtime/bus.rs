// warden-core/src/runtime/bus.rs
// ============================================================================
// Module: Event Bus
// Description: Fire-and-forget listener dispatch with per-listener deadlines.
// Purpose: Deliver governance events without blocking the decision path.
// Dependencies: futures, tokio, tracing, crate::core
// ============================================================================

//! ## Overview
//! The bus maps event types to ordered listener lists. `emit` returns to the
//! caller immediately: listeners run on spawned tasks, so the caller's stack
//! always unwinds before any listener executes. Each listener is awaited
//! independently for at most [`LISTENER_DEADLINE`]; a listener that exceeds
//! the deadline is abandoned but not cancelled, and a panicking listener is
//! isolated from its peers. All suppressed failures are logged at warn
//! level and never surface to the emitter.
//!
//! An optional trace resolver supplies the trace-id for `emit`; it is
//! consulted exactly once per call and a resolver panic degrades to an
//! absent trace. The [`EventBus::emit_event`] variant takes a fully formed
//! envelope and does not consult the resolver.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::warn;

use crate::core::EventData;
use crate::core::EventType;
use crate::core::GovernanceEvent;
use crate::core::TraceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Execution deadline applied to each listener per emission.
pub const LISTENER_DEADLINE: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Listener Types
// ============================================================================

/// Boxed future returned by a listener.
pub type ListenerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Listener function invoked with each matching event.
type ListenerFn = dyn Fn(GovernanceEvent) -> ListenerFuture + Send + Sync;

/// Trace resolver consulted once per `emit` call.
type TraceResolver = dyn Fn() -> Option<TraceId> + Send + Sync;

/// Registration handle returned by [`EventBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Fire-and-forget event bus keyed by event type.
pub struct EventBus {
    /// Listener lists per event type.
    listeners: Mutex<BTreeMap<EventType, Vec<(ListenerId, Arc<ListenerFn>)>>>,
    /// Optional trace resolver for `emit`.
    resolver: Mutex<Option<Arc<TraceResolver>>>,
    /// Next registration identifier.
    next_listener_id: AtomicU64,
}

impl EventBus {
    /// Creates a bus with no listeners and no trace resolver.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            resolver: Mutex::new(None),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Installs the trace resolver consulted by `emit`.
    pub fn set_trace_resolver<F>(&self, resolver: F)
    where
        F: Fn() -> Option<TraceId> + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.resolver.lock() {
            *guard = Some(Arc::new(resolver));
        }
    }

    /// Registers a listener for one event type.
    pub fn on<F>(&self, event_type: EventType, listener: F) -> ListenerId
    where
        F: Fn(GovernanceEvent) -> ListenerFuture + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut guard) = self.listeners.lock() {
            guard.entry(event_type).or_default().push((id, Arc::new(listener)));
        }
        id
    }

    /// Removes a listener; returns false when it was not registered.
    pub fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        let Ok(mut guard) = self.listeners.lock() else {
            return false;
        };
        let Some(entries) = guard.get_mut(&event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        before != entries.len()
    }

    /// Removes every listener for one type, or for all types.
    pub fn remove_all(&self, event_type: Option<EventType>) {
        let Ok(mut guard) = self.listeners.lock() else {
            return;
        };
        match event_type {
            Some(event_type) => {
                guard.remove(&event_type);
            }
            None => guard.clear(),
        }
    }

    /// Emits an event of the provided type, consulting the trace resolver.
    ///
    /// Returns before any listener executes.
    pub fn emit(&self, event_type: EventType, data: EventData) {
        let trace_id = self.resolve_trace();
        let mut event = GovernanceEvent::new(event_type, data);
        event.trace_id = trace_id;
        self.dispatch(event);
    }

    /// Emits a fully formed event without consulting the trace resolver.
    ///
    /// Returns before any listener executes.
    pub fn emit_event(&self, event: GovernanceEvent) {
        self.dispatch(event);
    }

    /// Consults the resolver once; a panic degrades to an absent trace.
    fn resolve_trace(&self) -> Option<TraceId> {
        let resolver = self.resolver.lock().ok()?.clone()?;
        match std::panic::catch_unwind(AssertUnwindSafe(|| resolver())) {
            Ok(trace_id) => trace_id,
            Err(_) => {
                warn!("trace resolver panicked; emitting without trace id");
                None
            }
        }
    }

    /// Dispatches an event to a snapshot of its listeners.
    fn dispatch(&self, event: GovernanceEvent) {
        let snapshot: Vec<Arc<ListenerFn>> = match self.listeners.lock() {
            Ok(guard) => guard
                .get(&event.event_type)
                .map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if snapshot.is_empty() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(
                event_type = event.event_type.as_str(),
                "event dropped: no async runtime available for dispatch"
            );
            return;
        };
        for listener in snapshot {
            let event = event.clone();
            let event_type = event.event_type;
            // The listener runs on its own task so exceeding the deadline
            // abandons the await without cancelling the work.
            let work = handle
                .spawn(async move { AssertUnwindSafe(listener(event)).catch_unwind().await });
            handle.spawn(async move {
                match tokio::time::timeout(LISTENER_DEADLINE, work).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(_))) | Ok(Err(_)) => {
                        warn!(event_type = event_type.as_str(), "event listener panicked");
                    }
                    Err(_) => {
                        warn!(
                            event_type = event_type.as_str(),
                            deadline_ms = u64::try_from(LISTENER_DEADLINE.as_millis())
                                .unwrap_or(u64::MAX),
                            "event listener exceeded dispatch deadline; no longer awaited"
                        );
                    }
                }
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
