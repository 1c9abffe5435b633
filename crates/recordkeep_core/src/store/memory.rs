//! In-process document store.
//!
//! # Responsibility
//! - Provide a dependency-free backing store for tests and embedded use.
//!
//! # Invariants
//! - One transaction runs at a time; the map lock is held for the whole body.
//! - Writes are staged and applied only after the body returns `Ok`.

use super::{
    merge_document, native_expiry_millis, system_time_seconds, DocumentRef, DocumentStore,
    DocumentTransaction, StoreError, StoreResult, TransactionBody,
};
use crate::persistence::PersistenceResult;
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded map of documents keyed by `DocumentRef`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<DocumentRef, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one document outside any transaction, replacing it entirely.
    ///
    /// Intended for seeding fixtures and importing raw documents.
    pub fn insert(&self, doc: &DocumentRef, document: Value) -> StoreResult<()> {
        self.lock()?.insert(doc.clone(), document);
        Ok(())
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Deletes documents whose native expiry is at or before `now_ms`.
    ///
    /// Returns the number of deleted documents.
    pub fn purge_expired(&self, now_ms: i64) -> StoreResult<usize> {
        let mut documents = self.lock()?;
        let before = documents.len();
        documents.retain(|_, document| {
            native_expiry_millis(document).map_or(true, |expires_at| expires_at > now_ms)
        });
        let purged = before - documents.len();
        debug!("event=ttl_purge module=store status=ok backend=memory purged={purged}");
        Ok(purged)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<DocumentRef, Value>>> {
        self.documents.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        Ok(self.lock()?.get(doc).cloned())
    }

    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
        let mut documents = self.lock()?;
        let staged = {
            let mut tx = MemoryTransaction {
                committed: &*documents,
                staged: BTreeMap::new(),
            };
            body(&mut tx)?;
            tx.staged
        };
        documents.extend(staged);
        Ok(())
    }

    fn server_time_seconds(&self) -> StoreResult<i64> {
        system_time_seconds()
    }
}

struct MemoryTransaction<'a> {
    committed: &'a BTreeMap<DocumentRef, Value>,
    staged: BTreeMap<DocumentRef, Value>,
}

impl DocumentTransaction for MemoryTransaction<'_> {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        Ok(self
            .staged
            .get(doc)
            .or_else(|| self.committed.get(doc))
            .cloned())
    }

    fn set(&mut self, doc: &DocumentRef, document: Value) -> StoreResult<()> {
        self.staged.insert(doc.clone(), document);
        Ok(())
    }

    fn merge(&mut self, doc: &DocumentRef, fields: Map<String, Value>) -> StoreResult<()> {
        let merged = merge_document(doc, self.get(doc)?, fields)?;
        self.staged.insert(doc.clone(), merged);
        Ok(())
    }
}
