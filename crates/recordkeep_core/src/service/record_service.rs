//! Record membership use-case service.
//!
//! # Responsibility
//! - Offer value-level operations (add, remove, replace, query) on top of
//!   any `PersistenceProvider`.
//! - Compute expiries from the injected `TimestampProvider`.
//!
//! # Invariants
//! - Every mutation goes through `update_and_get`; the service never writes
//!   directly.
//! - An expiry change is persisted only together with a value change, since
//!   the provider's change check ignores `expire_at`.

use crate::model::record::PersistenceRecord;
use crate::persistence::{PersistenceProvider, PersistenceResult};
use crate::timestamp::TimestampProvider;

/// Use-case service over a persistence provider and a clock.
pub struct RecordService<P: PersistenceProvider, T: TimestampProvider> {
    provider: P,
    clock: T,
}

impl<P: PersistenceProvider, T: TimestampProvider> RecordService<P, T> {
    pub fn new(provider: P, clock: T) -> Self {
        Self { provider, clock }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Adds `value` unless present. With `ttl_seconds`, the record expires
    /// that many seconds from now.
    pub fn add_value(
        &self,
        collection: &str,
        record: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> PersistenceResult<PersistenceRecord> {
        let expire_at = self.expire_at_for(ttl_seconds)?;
        self.provider
            .update_and_get(collection, record, &mut |current| {
                let mut next = current.clone();
                if !next.contains(value) {
                    next.values.push(value.to_string());
                }
                if expire_at.is_some() {
                    next.expire_at = expire_at;
                }
                next
            })
    }

    /// Removes every occurrence of `value`.
    pub fn remove_value(
        &self,
        collection: &str,
        record: &str,
        value: &str,
    ) -> PersistenceResult<PersistenceRecord> {
        self.provider
            .update_and_get(collection, record, &mut |current| {
                let mut next = current.clone();
                next.values.retain(|item| item != value);
                next
            })
    }

    /// Replaces the whole value list. `ttl_seconds = None` clears the expiry.
    pub fn replace_values(
        &self,
        collection: &str,
        record: &str,
        values: &[String],
        ttl_seconds: Option<u64>,
    ) -> PersistenceResult<PersistenceRecord> {
        let expire_at = self.expire_at_for(ttl_seconds)?;
        self.provider
            .update_and_get(collection, record, &mut |_| PersistenceRecord {
                values: values.to_vec(),
                expire_at,
            })
    }

    pub fn contains_value(
        &self,
        collection: &str,
        record: &str,
        value: &str,
    ) -> PersistenceResult<bool> {
        Ok(self.active_values(collection, record)?.iter().any(|item| item == value))
    }

    /// Returns stored values, or nothing once the record has expired.
    ///
    /// Expired records may still be physically present until the store's
    /// TTL sweep removes them.
    pub fn active_values(&self, collection: &str, record: &str) -> PersistenceResult<Vec<String>> {
        let current = self.provider.get(collection, record)?;
        if current.is_expired_at(self.clock.timestamp_seconds()?) {
            return Ok(Vec::new());
        }
        Ok(current.values)
    }

    fn expire_at_for(&self, ttl_seconds: Option<u64>) -> PersistenceResult<Option<i64>> {
        match ttl_seconds {
            Some(ttl) => {
                let now = self.clock.timestamp_seconds()?;
                let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
                Ok(Some(now.saturating_add(ttl)))
            }
            None => Ok(None),
        }
    }
}
