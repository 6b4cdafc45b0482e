// warden-core/src/core/hashing.rs
// ============================================================================
// Module: Audit Hash Chain
// Description: Canonical hashing and verification for audit records.
// Purpose: Bind audit rows into a tamper-evident SHA-256 chain.
// Dependencies: serde_jcs, sha2, subtle
// ============================================================================

//! ## Overview
//! Every audit record is hashed over a canonical JSON array of its content
//! plus a chain marker derived from its predecessor's hash. The genesis
//! marker `GENESIS_NULL` is structurally distinct from any legal hash, and
//! chained markers are prefixed `CHAIN:` so a hash value can never be
//! confused with the absence of one. Parameters are canonicalized with
//! RFC 8785 (JCS) so key order in storage never affects the digest.
//!
//! Verification compares recomputed and stored hashes in constant time and
//! walks the chain in ascending id order, reporting the first break.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::audit::AuditRecord;
use crate::core::audit::AuditResult;
use crate::core::audit::FailureCategory;
use crate::core::audit::NewAuditRecord;
use crate::core::condition::ParameterMap;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Chain marker used when a record has no predecessor.
pub const GENESIS_MARKER: &str = "GENESIS_NULL";
/// Prefix distinguishing a predecessor hash from the genesis marker.
pub const CHAIN_PREFIX: &str = "CHAIN:";
/// Length of a hex-encoded SHA-256 digest.
pub const HASH_LENGTH: usize = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while computing a chain hash.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize hash input: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Chained Content
// ============================================================================

/// Borrowed view of the record fields that participate in the hash.
#[derive(Debug, Clone, Copy)]
pub struct ChainedContent<'a> {
    /// Trace identifier string.
    pub trace_id: &'a str,
    /// RFC 3339 timestamp string, hashed verbatim.
    pub timestamp: &'a str,
    /// Agent identifier string.
    pub agent_id: &'a str,
    /// Tool name.
    pub tool: &'a str,
    /// Request parameters when captured.
    pub parameters: Option<&'a ParameterMap>,
    /// Recorded outcome.
    pub result: AuditResult,
    /// Reason when present.
    pub reason: Option<&'a str>,
    /// Decision latency in milliseconds.
    pub duration_ms: u64,
    /// Failure category when present.
    pub failure_category: Option<FailureCategory>,
}

impl<'a> From<&'a AuditRecord> for ChainedContent<'a> {
    fn from(record: &'a AuditRecord) -> Self {
        Self {
            trace_id: record.trace_id.as_str(),
            timestamp: &record.timestamp,
            agent_id: record.agent_id.as_str(),
            tool: &record.tool,
            parameters: record.parameters.as_ref(),
            result: record.result,
            reason: record.reason.as_deref(),
            duration_ms: record.duration_ms,
            failure_category: record.failure_category,
        }
    }
}

impl<'a> From<&'a NewAuditRecord> for ChainedContent<'a> {
    fn from(record: &'a NewAuditRecord) -> Self {
        Self {
            trace_id: record.trace_id.as_str(),
            timestamp: &record.timestamp,
            agent_id: record.agent_id.as_str(),
            tool: &record.tool,
            parameters: record.parameters.as_ref(),
            result: record.result,
            reason: record.reason.as_deref(),
            duration_ms: record.duration_ms,
            failure_category: record.failure_category,
        }
    }
}

// ============================================================================
// SECTION: Hash Computation
// ============================================================================

/// Returns the chain marker for a predecessor hash.
#[must_use]
pub fn chain_marker(previous_hash: Option<&str>) -> String {
    match previous_hash {
        None => GENESIS_MARKER.to_string(),
        Some(hash) => format!("{CHAIN_PREFIX}{hash}"),
    }
}

/// Canonicalizes a parameter map; absent parameters serialize to "".
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when JCS serialization fails.
pub fn canonical_parameters(parameters: Option<&ParameterMap>) -> Result<String, HashError> {
    match parameters {
        None => Ok(String::new()),
        Some(map) => {
            serde_jcs::to_string(map).map_err(|err| HashError::Canonicalization(err.to_string()))
        }
    }
}

/// Computes the chain hash of record content given its predecessor's hash.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the hash input cannot be
/// serialized.
pub fn compute_hash(
    content: &ChainedContent<'_>,
    previous_hash: Option<&str>,
) -> Result<String, HashError> {
    let marker = chain_marker(previous_hash);
    let parameters = canonical_parameters(content.parameters)?;
    let duration = content.duration_ms.to_string();
    let fields: [&str; 10] = [
        &marker,
        content.trace_id,
        content.timestamp,
        content.agent_id,
        content.tool,
        &parameters,
        content.result.as_str(),
        content.reason.unwrap_or(""),
        &duration,
        content.failure_category.map_or("", FailureCategory::as_str),
    ];
    let bytes = canonical_json_bytes(&fields)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex_encode(&hasher.finalize()))
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a record's stored hash against its recomputed hash.
///
/// The comparison is constant-time over equal-length buffers; a length
/// mismatch short-circuits to `false`.
#[must_use]
pub fn verify_record(record: &AuditRecord) -> bool {
    let Ok(expected) = compute_hash(&record.into(), record.previous_hash.as_deref()) else {
        return false;
    };
    constant_time_eq(expected.as_bytes(), record.hash.as_bytes())
}

/// Compares two byte slices in constant time.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Outcome of a full chain walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// True when every record verified.
    pub valid: bool,
    /// Identifier of the first broken record, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<i64>,
    /// Total records in the chain.
    pub total_events: u64,
    /// Records verified before the first break.
    pub verified_events: u64,
}

/// Walks records in ascending id order and reports the first break.
///
/// Each record must link to the running predecessor hash (initially the
/// genesis sentinel) and verify against its own stored hash.
#[must_use]
pub fn verify_chain(records: &[AuditRecord]) -> ChainVerification {
    let total_events = u64::try_from(records.len()).unwrap_or(u64::MAX);
    let mut previous: Option<&str> = None;
    let mut verified_events: u64 = 0;
    for record in records {
        let linked = record.previous_hash.as_deref() == previous;
        if !linked || !verify_record(record) {
            return ChainVerification {
                valid: false,
                broken_at: Some(record.id),
                total_events,
                verified_events,
            };
        }
        verified_events += 1;
        previous = Some(record.hash.as_str());
    }
    ChainVerification {
        valid: true,
        broken_at: None,
        total_events,
        verified_events,
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let hi = usize::from(byte >> 4);
        let lo = usize::from(byte & 0x0f);
        out.push(char::from(HEX[hi]));
        out.push(char::from(HEX[lo]));
    }
    out
}
