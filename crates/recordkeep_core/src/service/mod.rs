//! Use-case services built on the persistence contract.
//!
//! # Responsibility
//! - Express value-level record operations without touching store details.

pub mod record_service;
