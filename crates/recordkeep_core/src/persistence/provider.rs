//! Document-store-backed persistence provider.
//!
//! # Responsibility
//! - Resolve (collection, record) pairs into document references.
//! - Run the transactional get-modify-put protocol with change detection.
//! - Write the store-native expiry marker alongside saved records.
//!
//! # Invariants
//! - Every read validates the stored document shape.
//! - A save happens only when the updated values differ from the stored ones
//!   as a multiset.
//! - A save is two writes: a full overwrite with the record fields, then a
//!   merge of `u` and the native expiry field.
//! - No locking or retry happens here; both belong to the store.

use super::{PersistenceError, PersistenceProvider, PersistenceResult, RecordUpdater};
use crate::model::record::{PersistenceRecord, VALUES_FIELD};
use crate::store::{DocumentRef, DocumentStore, DocumentTransaction, NATIVE_EXPIRY_FIELD};
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Observability callback receiving one human-readable line per read/save.
pub type DebugFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Converts epoch milliseconds into the store-native expiry value.
pub type ExpireAtFromMillisFn = Arc<dyn Fn(i64) -> Value + Send + Sync>;

/// Persistence provider over any `DocumentStore`.
pub struct DocumentPersistenceProvider<S: DocumentStore> {
    store: S,
    debug_fn: DebugFn,
    create_expire_at_from_millis: Option<ExpireAtFromMillisFn>,
}

impl<S: DocumentStore> DocumentPersistenceProvider<S> {
    /// Creates a provider with a no-op debug callback and no expiry hook.
    pub fn new(store: S) -> Self {
        Self {
            store,
            debug_fn: Arc::new(|_: &str| {}),
            create_expire_at_from_millis: None,
        }
    }

    pub fn with_debug_fn(mut self, debug_fn: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.set_debug_fn(debug_fn);
        self
    }

    pub fn with_create_expire_at_from_millis(
        mut self,
        hook: impl Fn(i64) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.set_create_expire_at_from_millis(hook);
        self
    }

    /// Replaces the debug callback. Takes effect on the next call.
    pub fn set_debug_fn(&mut self, debug_fn: impl Fn(&str) + Send + Sync + 'static) {
        self.debug_fn = Arc::new(debug_fn);
    }

    /// Replaces the native expiry hook. Takes effect on the next save.
    pub fn set_create_expire_at_from_millis(
        &mut self,
        hook: impl Fn(i64) -> Value + Send + Sync + 'static,
    ) {
        self.create_expire_at_from_millis = Some(Arc::new(hook));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_record(
        &self,
        tx: &dyn DocumentTransaction,
        doc: &DocumentRef,
    ) -> PersistenceResult<PersistenceRecord> {
        let document = tx.get(doc)?;
        self.parse_record(doc, document)
    }

    fn parse_record(
        &self,
        doc: &DocumentRef,
        document: Option<Value>,
    ) -> PersistenceResult<PersistenceRecord> {
        (self.debug_fn)(&format!(
            "Got record from collection={}, document={}",
            doc.collection(),
            doc.name()
        ));

        match document {
            Some(document) => Ok(PersistenceRecord::from_document(document)?),
            None => Ok(PersistenceRecord::empty()),
        }
    }

    fn save_record(
        &self,
        tx: &mut dyn DocumentTransaction,
        doc: &DocumentRef,
        record: &PersistenceRecord,
    ) -> PersistenceResult<()> {
        (self.debug_fn)(&format!(
            "Save record collection={}, document={}",
            doc.collection(),
            doc.name()
        ));

        tx.set(doc, record.to_document())?;

        let native_expiry = match (&self.create_expire_at_from_millis, record.expire_at_millis()) {
            (Some(hook), Some(millis)) => hook(millis),
            _ => Value::Null,
        };
        let mut fields = Map::new();
        fields.insert(VALUES_FIELD.to_string(), Value::from(record.values.clone()));
        fields.insert(NATIVE_EXPIRY_FIELD.to_string(), native_expiry);
        tx.merge(doc, fields)?;

        debug!(
            "event=record_save module=persistence status=ok document={} values={} expires={}",
            doc,
            record.values.len(),
            record.expire_at.is_some()
        );
        Ok(())
    }
}

impl<S: DocumentStore> PersistenceProvider for DocumentPersistenceProvider<S> {
    fn get(&self, collection: &str, record: &str) -> PersistenceResult<PersistenceRecord> {
        let doc = DocumentRef::new(collection, record)?;
        let document = self.store.get(&doc)?;
        self.parse_record(&doc, document)
    }

    fn update_and_get(
        &self,
        collection: &str,
        record: &str,
        updater: &mut RecordUpdater<'_>,
    ) -> PersistenceResult<PersistenceRecord> {
        let doc = DocumentRef::new(collection, record)?;
        let mut result = None;

        self.store.run_transaction(&mut |tx| {
            let current = self.read_record(&*tx, &doc)?;
            let updated = updater(&current);
            if updated.has_changed_from(&current) {
                self.save_record(tx, &doc, &updated)?;
            } else {
                debug!("event=record_update module=persistence status=unchanged document={doc}");
            }
            result = Some(updated);
            Ok(())
        })?;

        result.ok_or_else(|| PersistenceError::MissingTransactionResult {
            document: doc.path(),
        })
    }
}
