//! Injectable clocks for expiry computations.
//!
//! # Responsibility
//! - Supply "now" in whole epoch seconds behind one small trait.
//! - Prefer the backing store's clock so computed expiries agree with the
//!   store's own TTL enforcement.

use crate::store::{system_time_seconds, DocumentStore, StoreResult};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time in epoch seconds.
pub trait TimestampProvider {
    fn timestamp_seconds(&self) -> StoreResult<i64>;
}

impl<T: TimestampProvider + ?Sized> TimestampProvider for Arc<T> {
    fn timestamp_seconds(&self) -> StoreResult<i64> {
        (**self).timestamp_seconds()
    }
}

impl<T: TimestampProvider + ?Sized> TimestampProvider for &T {
    fn timestamp_seconds(&self) -> StoreResult<i64> {
        (**self).timestamp_seconds()
    }
}

/// Reads time from the backing store.
pub struct StoreTimestampProvider<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> StoreTimestampProvider<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: DocumentStore> TimestampProvider for StoreTimestampProvider<S> {
    fn timestamp_seconds(&self) -> StoreResult<i64> {
        self.store.server_time_seconds()
    }
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimestampProvider;

impl TimestampProvider for SystemTimestampProvider {
    fn timestamp_seconds(&self) -> StoreResult<i64> {
        system_time_seconds()
    }
}

/// Manually driven clock for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct FixedTimestampProvider {
    seconds: AtomicI64,
}

impl FixedTimestampProvider {
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    pub fn set(&self, seconds: i64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds` and returns the new value.
    pub fn advance(&self, seconds: i64) -> i64 {
        self.seconds.fetch_add(seconds, Ordering::SeqCst) + seconds
    }
}

impl TimestampProvider for FixedTimestampProvider {
    fn timestamp_seconds(&self) -> StoreResult<i64> {
        Ok(self.seconds.load(Ordering::SeqCst))
    }
}
