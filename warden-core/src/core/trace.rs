// warden-core/src/core/trace.rs
// ============================================================================
// Module: Trace Carrier
// Description: W3C trace-context identifiers and ambient propagation.
// Purpose: Generate, validate, and parse trace identifiers fail-closed.
// Dependencies: rand, serde, tokio
// ============================================================================

//! ## Overview
//! This module defines the trace carrier for Warden. Trace and span
//! identifiers follow the W3C `traceparent` format: strict lowercase hex,
//! all-zero values rejected. Caller-supplied identifiers are untrusted;
//! invalid input causes regeneration, never rejection, so every decision
//! always carries a well-formed trace. Parsing of foreign headers returns
//! `None` instead of a fallback so callers decide whether to regenerate.
//!
//! The ambient primitive is a tokio task-local scope: work launched inside
//! [`with_trace_context`] observes the same trace-id, including concurrent
//! subtasks spawned from that region.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of a trace identifier in hex characters.
pub const TRACE_ID_LENGTH: usize = 32;
/// Length of a span identifier in hex characters.
pub const SPAN_ID_LENGTH: usize = 16;
/// The only `traceparent` version accepted by Warden.
pub const TRACEPARENT_VERSION: &str = "00";
/// Trace flags emitted on outgoing headers (always sampled).
pub const TRACE_FLAGS_SAMPLED: &str = "01";

// ============================================================================
// SECTION: Trace Identifiers
// ============================================================================

/// W3C trace identifier: 32 lowercase hex characters, not all zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Generates a fresh trace identifier from a cryptographic source.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_hex_id(TRACE_ID_LENGTH / 2))
    }

    /// Parses a trace identifier, returning `None` when invalid.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        is_valid_hex_id(value, TRACE_ID_LENGTH).then(|| Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// W3C span identifier: 16 lowercase hex characters, not all zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(String);

impl SpanId {
    /// Generates a fresh span identifier from a cryptographic source.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_hex_id(SPAN_ID_LENGTH / 2))
    }

    /// Parses a span identifier, returning `None` when invalid.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        is_valid_hex_id(value, SPAN_ID_LENGTH).then(|| Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Trace Context
// ============================================================================

/// Immutable trace context carried through one `evaluate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Trace identifier shared by every artifact of the call.
    pub trace_id: TraceId,
    /// Span identifier for this unit of work.
    pub span_id: SpanId,
}

impl TraceContext {
    /// Creates a context with freshly generated identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
        }
    }

    /// Creates a context for an existing trace with a fresh span.
    #[must_use]
    pub fn for_trace(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            span_id: SpanId::generate(),
        }
    }

    /// Resolves a caller-supplied trace identifier.
    ///
    /// Valid input is reused; missing, malformed, or all-zero input causes
    /// regeneration rather than rejection.
    #[must_use]
    pub fn resolve(supplied: Option<&str>) -> Self {
        match supplied.and_then(TraceId::parse) {
            Some(trace_id) => Self::for_trace(trace_id),
            None => Self::new(),
        }
    }

    /// Renders the W3C `traceparent` header for this context.
    #[must_use]
    pub fn traceparent(&self) -> String {
        format!(
            "{TRACEPARENT_VERSION}-{}-{}-{TRACE_FLAGS_SAMPLED}",
            self.trace_id.as_str(),
            self.span_id.as_str()
        )
    }

    /// Parses a foreign `traceparent` header.
    ///
    /// Returns `None` for any version other than `00`, malformed fields, or
    /// all-zero components, leaving the regeneration decision to the caller.
    #[must_use]
    pub fn parse_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() || version != TRACEPARENT_VERSION {
            return None;
        }
        if flags.len() != 2 || !flags.bytes().all(is_lower_hex) {
            return None;
        }
        Some(Self {
            trace_id: TraceId::parse(trace_id)?,
            span_id: SpanId::parse(span_id)?,
        })
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.traceparent())
    }
}

// ============================================================================
// SECTION: Ambient Context
// ============================================================================

tokio::task_local! {
    /// Ambient trace context for the current task tree.
    static AMBIENT_TRACE: TraceContext;
}

/// Runs a future with the provided trace context as the ambient context.
///
/// Any work awaited inside the region, including subtasks that capture the
/// context at spawn time, observes the same trace-id.
pub async fn with_trace_context<F>(context: TraceContext, future: F) -> F::Output
where
    F: Future,
{
    AMBIENT_TRACE.scope(context, future).await
}

/// Returns the ambient trace context, if one is in scope.
#[must_use]
pub fn current_trace_context() -> Option<TraceContext> {
    AMBIENT_TRACE.try_with(Clone::clone).ok()
}

/// Returns the ambient trace identifier, if one is in scope.
#[must_use]
pub fn current_trace_id() -> Option<TraceId> {
    AMBIENT_TRACE.try_with(|context| context.trace_id.clone()).ok()
}

// ============================================================================
// SECTION: Hex Helpers
// ============================================================================

/// Generates a non-zero lowercase hex identifier of `bytes * 2` characters.
fn generate_hex_id(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    loop {
        OsRng.fill_bytes(&mut buffer);
        if buffer.iter().any(|byte| *byte != 0) {
            break;
        }
    }
    let mut out = String::with_capacity(bytes * 2);
    for byte in &buffer {
        out.push(hex_digit(byte >> 4));
        out.push(hex_digit(byte & 0x0f));
    }
    out
}

/// Returns the lowercase hex digit for a nibble.
const fn hex_digit(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        _ => (b'a' + nibble - 10) as char,
    }
}

/// Validates a strict lowercase hex identifier of the expected length.
fn is_valid_hex_id(value: &str, expected_length: usize) -> bool {
    value.len() == expected_length
        && value.bytes().all(is_lower_hex)
        && value.bytes().any(|byte| byte != b'0')
}

/// Returns true for lowercase hex digit bytes.
const fn is_lower_hex(byte: u8) -> bool {
    byte.is_ascii_digit() || matches!(byte, b'a'..=b'f')
}
