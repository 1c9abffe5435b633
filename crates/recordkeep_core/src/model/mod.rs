//! Domain model for keyed persistence records.
//!
//! # Responsibility
//! - Define the record shape shared by every backing store adapter.
//! - Keep validation next to the data it guards.
//!
//! # Invariants
//! - Records read from any store pass `PersistenceRecord::from_document`.

pub mod record;
