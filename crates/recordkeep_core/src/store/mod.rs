//! Backing document store contract and adapters.
//!
//! # Responsibility
//! - Describe the minimal capability set the persistence layer needs from a
//!   transactional document store.
//! - Provide SQLite and in-memory adapters behind that contract.
//!
//! # Invariants
//! - A transaction body either commits all its writes or none of them.
//! - Conflict retries belong to the adapter, never to its callers.
//! - Stored documents are JSON values; the store does not interpret record
//!   fields except the native expiry field.

use crate::db::DbError;
use crate::persistence::PersistenceResult;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

mod document_ref;
pub mod memory;
pub mod sqlite;

pub use document_ref::DocumentRef;

/// Document field holding the store-native expiry marker.
///
/// Adapters that support TTL sweeps read this field when a document is
/// written; everything else about the document is opaque to them.
pub const NATIVE_EXPIRY_FIELD: &str = "expireAtTtl";

pub type StoreResult<T> = Result<T, StoreError>;

/// Transaction body executed by `DocumentStore::run_transaction`.
pub type TransactionBody<'a> =
    dyn FnMut(&mut dyn DocumentTransaction) -> PersistenceResult<()> + 'a;

/// Backing store failures surfaced unchanged to persistence callers.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    CorruptDocument {
        document: String,
        message: String,
    },
    Serialization(serde_json::Error),
    Poisoned,
    ConflictRetriesExhausted {
        attempts: u32,
    },
    ClockUnavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::CorruptDocument { document, message } => {
                write!(f, "stored document `{document}` is unreadable: {message}")
            }
            Self::Serialization(err) => write!(f, "document serialization failed: {err}"),
            Self::Poisoned => write!(f, "document store lock poisoned"),
            Self::ConflictRetriesExhausted { attempts } => {
                write!(f, "transaction still conflicting after {attempts} attempts")
            }
            Self::ClockUnavailable(message) => write!(f, "store clock unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

impl StoreError {
    /// Returns whether the failure is a write conflict the adapter may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

/// Reads and writes visible inside one store transaction.
pub trait DocumentTransaction {
    /// Returns the document, including writes staged earlier in this transaction.
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>>;
    /// Replaces the whole document.
    fn set(&mut self, doc: &DocumentRef, document: Value) -> StoreResult<()>;
    /// Overwrites only the given top-level fields, creating the document if absent.
    fn merge(&mut self, doc: &DocumentRef, fields: Map<String, Value>) -> StoreResult<()>;
}

/// Transactional keyed document store.
pub trait DocumentStore {
    /// Reads one document outside any transaction.
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>>;

    /// Runs `body` with isolation from other transactions.
    ///
    /// The body may be invoked more than once when the adapter retries a
    /// conflicting attempt. Writes from failed attempts are discarded.
    ///
    /// The bundled adapters hold a lock for the whole body, so `body` must
    /// not re-enter this store.
    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()>;

    /// Current time according to the store, in epoch seconds.
    fn server_time_seconds(&self) -> StoreResult<i64>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        (**self).get(doc)
    }

    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
        (**self).run_transaction(body)
    }

    fn server_time_seconds(&self) -> StoreResult<i64> {
        (**self).server_time_seconds()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        (**self).get(doc)
    }

    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
        (**self).run_transaction(body)
    }

    fn server_time_seconds(&self) -> StoreResult<i64> {
        (**self).server_time_seconds()
    }
}

/// Applies a field-level merge on top of the current document.
pub(crate) fn merge_document(
    doc: &DocumentRef,
    current: Option<Value>,
    fields: Map<String, Value>,
) -> StoreResult<Value> {
    let mut merged = match current {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(StoreError::CorruptDocument {
                document: doc.path(),
                message: "merge target is not an object".to_string(),
            });
        }
    };
    merged.extend(fields);
    Ok(Value::Object(merged))
}

/// Reads the native expiry marker as epoch milliseconds, if present.
pub(crate) fn native_expiry_millis(document: &Value) -> Option<i64> {
    document.get(NATIVE_EXPIRY_FIELD).and_then(Value::as_i64)
}

/// Converts epoch milliseconds into the native expiry value both bundled
/// adapters understand.
pub fn expire_at_from_millis(millis: i64) -> Value {
    Value::from(millis)
}

pub(crate) fn system_time_seconds() -> StoreResult<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| StoreError::ClockUnavailable(err.to_string()))?;
    i64::try_from(elapsed.as_secs())
        .map_err(|err| StoreError::ClockUnavailable(err.to_string()))
}
