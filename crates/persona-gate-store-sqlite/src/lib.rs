// persona-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Persona Gate Store
// Description: Durable store backend using SQLite WAL.
// Purpose: Provide production-grade persistence for every Persona Gate entity.
// Dependencies: persona-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of every Persona Gate
//! store trait. Rows pair indexed key columns with a JSON snapshot of the
//! entity; uniqueness invariants (single active release per scope, single
//! firing alert per dedup key, single assignment per subject) are enforced
//! by the schema so concurrent writers cannot violate them.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
