// warden-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Governance Store Library
// Description: Durable GovernanceStore backed by SQLite WAL.
// Purpose: Expose the SQLite store, its configuration, and its errors.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate implements the Warden persistence contract over an embedded
//! `SQLite` database: write-ahead logging, an append-only audit table
//! enforced with triggers, policy history snapshots, approvals with
//! optimistic resolution, and tenant-scoped handles.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SCHEMA_VERSION;
pub use store::SqliteGovernanceStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
