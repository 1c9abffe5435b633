//! Keyed persistence records with transactional read-modify-write.
//!
//! Records live in a pluggable transactional document store; the update
//! protocol only writes when a record's values actually changed.

pub mod db;
pub mod logging;
pub mod model;
pub mod persistence;
pub mod service;
pub mod store;
pub mod timestamp;

pub use logging::{default_log_level, init_logging, log_debug_fn, logging_status};
pub use model::record::{PersistenceRecord, RecordValidationError};
pub use persistence::{
    DocumentPersistenceProvider, PersistenceError, PersistenceProvider, PersistenceResult,
    RecordUpdater,
};
pub use service::record_service::RecordService;
pub use store::memory::MemoryDocumentStore;
pub use store::sqlite::{SqliteDocumentStore, SqliteStoreOptions};
pub use store::{
    expire_at_from_millis, DocumentRef, DocumentStore, DocumentTransaction, StoreError,
    StoreResult,
};
pub use timestamp::{
    FixedTimestampProvider, StoreTimestampProvider, SystemTimestampProvider, TimestampProvider,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
