use recordkeep_core::store::TransactionBody;
use recordkeep_core::{
    expire_at_from_millis, DocumentPersistenceProvider, DocumentRef, DocumentStore,
    DocumentTransaction, MemoryDocumentStore, PersistenceError, PersistenceProvider,
    PersistenceRecord, PersistenceResult, StoreResult,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory store that counts physical writes made inside transactions.
#[derive(Default)]
struct CountingStore {
    inner: MemoryDocumentStore,
    sets: AtomicUsize,
    merges: AtomicUsize,
}

impl CountingStore {
    fn writes(&self) -> usize {
        self.sets.load(Ordering::SeqCst) + self.merges.load(Ordering::SeqCst)
    }
}

struct CountingTransaction<'a> {
    inner: &'a mut dyn DocumentTransaction,
    store: &'a CountingStore,
}

impl DocumentTransaction for CountingTransaction<'_> {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        self.inner.get(doc)
    }

    fn set(&mut self, doc: &DocumentRef, document: Value) -> StoreResult<()> {
        self.store.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(doc, document)
    }

    fn merge(&mut self, doc: &DocumentRef, fields: Map<String, Value>) -> StoreResult<()> {
        self.store.merges.fetch_add(1, Ordering::SeqCst);
        self.inner.merge(doc, fields)
    }
}

impl DocumentStore for CountingStore {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        self.inner.get(doc)
    }

    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
        self.inner.run_transaction(&mut |tx| {
            let mut counting = CountingTransaction { inner: tx, store: self };
            body(&mut counting)
        })
    }

    fn server_time_seconds(&self) -> StoreResult<i64> {
        self.inner.server_time_seconds()
    }
}

fn seeded_provider(values: &[&str]) -> DocumentPersistenceProvider<CountingStore> {
    let store = CountingStore::default();
    let doc = DocumentRef::new("members", "team").unwrap();
    store
        .inner
        .insert(&doc, json!({ "u": values, "expireAt": null }))
        .unwrap();
    DocumentPersistenceProvider::new(store)
}

#[test]
fn get_on_absent_key_returns_empty_record() {
    let provider = DocumentPersistenceProvider::new(CountingStore::default());
    let record = provider.get("members", "nobody").unwrap();
    assert_eq!(record, PersistenceRecord::empty());
    assert!(record.values.is_empty());
    assert_eq!(record.expire_at, None);
}

#[test]
fn unchanged_set_performs_no_writes() {
    let provider = seeded_provider(&["a", "b"]);
    let record = provider
        .update_and_get("members", "team", &mut |current| current.clone())
        .unwrap();

    assert_eq!(record.values, vec!["a", "b"]);
    assert_eq!(provider.store().writes(), 0);
}

#[test]
fn reordered_values_do_not_trigger_a_write() {
    let provider = seeded_provider(&["a", "b", "c"]);
    let record = provider
        .update_and_get("members", "team", &mut |_| {
            PersistenceRecord::with_values(["c", "a", "b"])
        })
        .unwrap();

    assert_eq!(record.values, vec!["c", "a", "b"]);
    assert_eq!(provider.store().writes(), 0);

    let stored = provider.get("members", "team").unwrap();
    assert_eq!(stored.values, vec!["a", "b", "c"]);
}

#[test]
fn changed_set_saves_once_with_two_physical_writes() {
    let provider = seeded_provider(&["a", "b"]);
    let record = provider
        .update_and_get("members", "team", &mut |current| {
            let mut next = current.clone();
            next.values.push("c".to_string());
            next
        })
        .unwrap();

    assert_eq!(record.values, vec!["a", "b", "c"]);
    assert_eq!(provider.store().sets.load(Ordering::SeqCst), 1);
    assert_eq!(provider.store().merges.load(Ordering::SeqCst), 1);
    assert_eq!(provider.get("members", "team").unwrap(), record);
}

#[test]
fn length_mismatch_always_writes() {
    let provider = seeded_provider(&["a"]);
    provider
        .update_and_get("members", "team", &mut |_| {
            PersistenceRecord::with_values(["a", "a"])
        })
        .unwrap();

    assert_eq!(provider.store().writes(), 2);
    assert_eq!(
        provider.get("members", "team").unwrap().values,
        vec!["a", "a"]
    );
}

#[test]
fn expiry_only_change_is_not_persisted() {
    let provider = seeded_provider(&["a"]);
    let record = provider
        .update_and_get("members", "team", &mut |current| PersistenceRecord {
            values: current.values.clone(),
            expire_at: Some(1_800_000_000),
        })
        .unwrap();

    assert_eq!(record.expire_at, Some(1_800_000_000));
    assert_eq!(provider.store().writes(), 0);
    assert_eq!(provider.get("members", "team").unwrap().expire_at, None);
}

#[test]
fn absent_key_insert_without_expiry_writes_null_native_expiry() {
    let provider = DocumentPersistenceProvider::new(CountingStore::default())
        .with_create_expire_at_from_millis(expire_at_from_millis);
    provider
        .update_and_get("members", "fresh", &mut |_| {
            PersistenceRecord::with_values(["x"])
        })
        .unwrap();

    let doc = DocumentRef::new("members", "fresh").unwrap();
    let raw = provider.store().get(&doc).unwrap().unwrap();
    assert_eq!(
        raw,
        json!({ "u": ["x"], "expireAt": null, "expireAtTtl": null })
    );
    assert_eq!(
        provider.get("members", "fresh").unwrap(),
        PersistenceRecord::with_values(["x"])
    );
}

#[test]
fn native_expiry_comes_from_hook_in_millis() {
    let provider = DocumentPersistenceProvider::new(CountingStore::default())
        .with_create_expire_at_from_millis(|millis| json!({ "ttlMillis": millis }));
    provider
        .update_and_get("members", "expiring", &mut |_| PersistenceRecord {
            values: vec!["x".to_string()],
            expire_at: Some(1_700_000_000),
        })
        .unwrap();

    let doc = DocumentRef::new("members", "expiring").unwrap();
    let raw = provider.store().get(&doc).unwrap().unwrap();
    assert_eq!(raw["expireAt"], json!(1_700_000_000));
    assert_eq!(raw["expireAtTtl"], json!({ "ttlMillis": 1_700_000_000_000_i64 }));
}

#[test]
fn native_expiry_is_null_without_hook() {
    let provider = DocumentPersistenceProvider::new(CountingStore::default());
    provider
        .update_and_get("members", "expiring", &mut |_| PersistenceRecord {
            values: vec!["x".to_string()],
            expire_at: Some(1_700_000_000),
        })
        .unwrap();

    let doc = DocumentRef::new("members", "expiring").unwrap();
    let raw = provider.store().get(&doc).unwrap().unwrap();
    assert_eq!(raw["expireAt"], json!(1_700_000_000));
    assert_eq!(raw["expireAtTtl"], Value::Null);
}

#[test]
fn malformed_stored_record_fails_validation() {
    let store = CountingStore::default();
    let missing_values = DocumentRef::new("members", "missing").unwrap();
    let numeric_values = DocumentRef::new("members", "numeric").unwrap();
    store
        .inner
        .insert(&missing_values, json!({ "expireAt": null }))
        .unwrap();
    store
        .inner
        .insert(&numeric_values, json!({ "u": [1, "two"] }))
        .unwrap();
    let provider = DocumentPersistenceProvider::new(store);

    let err = provider.get("members", "missing").unwrap_err();
    assert!(matches!(err, PersistenceError::Validation(_)));

    let err = provider
        .update_and_get("members", "numeric", &mut |current| current.clone())
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Validation(_)));
    assert_eq!(provider.store().writes(), 0);
}

#[test]
fn provider_works_through_trait_object() {
    let provider = DocumentPersistenceProvider::new(MemoryDocumentStore::new());
    let dynamic: &dyn PersistenceProvider = &provider;
    let record = dynamic
        .update_and_get("members", "dyn", &mut |_| {
            PersistenceRecord::with_values(["k"])
        })
        .unwrap();
    assert_eq!(dynamic.get("members", "dyn").unwrap(), record);
}

#[test]
fn updater_may_read_from_an_unrelated_store() {
    let lookup = DocumentPersistenceProvider::new(MemoryDocumentStore::new());
    lookup
        .update_and_get("defaults", "team", &mut |_| {
            PersistenceRecord::with_values(["seed"])
        })
        .unwrap();

    let provider = DocumentPersistenceProvider::new(CountingStore::default());
    let record = provider
        .update_and_get("members", "team", &mut |current| {
            let mut next = current.clone();
            next.values
                .extend(lookup.get("defaults", "team").unwrap().values);
            next
        })
        .unwrap();

    assert_eq!(record.values, vec!["seed"]);
    assert_eq!(provider.store().writes(), 2);
}
