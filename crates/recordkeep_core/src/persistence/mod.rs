//! Persistence provider contract.
//!
//! # Responsibility
//! - Define the read and read-modify-write operations callers depend on.
//! - Define the error taxonomy shared by every provider implementation.
//!
//! # Invariants
//! - Malformed stored records surface as `Validation`, never coerced.
//! - Backing-store failures surface as `Store`, unmodified.

use crate::model::record::{PersistenceRecord, RecordValidationError};
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod provider;

pub use provider::{DebugFn, DocumentPersistenceProvider, ExpireAtFromMillisFn};

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Updater applied to the current record inside `update_and_get`.
///
/// May run more than once when the backing store retries a transaction.
///
/// Runs while the store holds its transaction lock, so it must not call back
/// into the same provider or store; doing so blocks forever. Reads from an
/// unrelated store are fine.
pub type RecordUpdater<'a> = dyn FnMut(&PersistenceRecord) -> PersistenceRecord + 'a;

#[derive(Debug)]
pub enum PersistenceError {
    Validation(RecordValidationError),
    Store(StoreError),
    /// The transaction returned without producing a record.
    MissingTransactionResult { document: String },
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::MissingTransactionResult { document } => write!(
                f,
                "persistence record `{document}` could not be updated: transaction produced no result"
            ),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::MissingTransactionResult { .. } => None,
        }
    }
}

impl From<RecordValidationError> for PersistenceError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for PersistenceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl PersistenceError {
    /// Returns whether a store adapter may retry the failed transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

/// Keyed record store with an atomic read-modify-write primitive.
pub trait PersistenceProvider {
    /// Reads one record; absent keys yield `PersistenceRecord::empty()`.
    fn get(&self, collection: &str, record: &str) -> PersistenceResult<PersistenceRecord>;

    /// Applies `updater` to the current record in one transaction and
    /// returns the updated record, persisted only if its values changed.
    fn update_and_get(
        &self,
        collection: &str,
        record: &str,
        updater: &mut RecordUpdater<'_>,
    ) -> PersistenceResult<PersistenceRecord>;
}

impl<P: PersistenceProvider + ?Sized> PersistenceProvider for &P {
    fn get(&self, collection: &str, record: &str) -> PersistenceResult<PersistenceRecord> {
        (**self).get(collection, record)
    }

    fn update_and_get(
        &self,
        collection: &str,
        record: &str,
        updater: &mut RecordUpdater<'_>,
    ) -> PersistenceResult<PersistenceRecord> {
        (**self).update_and_get(collection, record, updater)
    }
}

impl<P: PersistenceProvider + ?Sized> PersistenceProvider for std::sync::Arc<P> {
    fn get(&self, collection: &str, record: &str) -> PersistenceResult<PersistenceRecord> {
        (**self).get(collection, record)
    }

    fn update_and_get(
        &self,
        collection: &str,
        record: &str,
        updater: &mut RecordUpdater<'_>,
    ) -> PersistenceResult<PersistenceRecord> {
        (**self).update_and_get(collection, record, updater)
    }
}
