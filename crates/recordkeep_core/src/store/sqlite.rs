//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON documents in the `documents` table keyed by
//!   (collection, name).
//! - Run transaction bodies under `BEGIN IMMEDIATE` and own the conflict
//!   retry policy.
//! - Mirror the native expiry field into `ttl_expires_at_ms` for TTL sweeps.
//!
//! # Invariants
//! - Only migrated connections are accepted.
//! - A body that fails with a non-conflict error is rolled back and never
//!   retried.

use super::{
    merge_document, native_expiry_millis, DocumentRef, DocumentStore, DocumentTransaction,
    StoreError, StoreResult, TransactionBody,
};
use crate::db::migrations::{current_version, latest_version};
use crate::db::{open_db, open_db_in_memory};
use crate::persistence::PersistenceResult;
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DOCUMENT_SELECT_SQL: &str =
    "SELECT data FROM documents WHERE collection = ?1 AND name = ?2;";

const DOCUMENT_UPSERT_SQL: &str = "INSERT INTO documents (
        collection,
        name,
        data,
        ttl_expires_at_ms,
        updated_at
    ) VALUES (?1, ?2, ?3, ?4, (strftime('%s', 'now') * 1000))
    ON CONFLICT (collection, name) DO UPDATE SET
        data = excluded.data,
        ttl_expires_at_ms = excluded.ttl_expires_at_ms,
        updated_at = excluded.updated_at;";

/// Tuning for the SQLite adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteStoreOptions {
    /// Total attempts for one transaction body, including the first.
    pub max_transaction_attempts: u32,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
}

impl Default for SqliteStoreOptions {
    fn default() -> Self {
        Self {
            max_transaction_attempts: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Document store over one SQLite connection.
///
/// The connection sits behind a mutex so the store is `Sync`; separate
/// stores opened on the same file are isolated by SQLite locking.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    options: SqliteStoreOptions,
}

impl SqliteDocumentStore {
    /// Wraps an already-migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version differs from
    ///   the latest known migration.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        Self::with_options(conn, SqliteStoreOptions::default())
    }

    pub fn with_options(conn: Connection, options: SqliteStoreOptions) -> StoreResult<Self> {
        let actual_version = current_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(StoreError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        conn.busy_timeout(options.busy_timeout)?;

        Ok(Self {
            conn: Mutex::new(conn),
            options,
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub fn options(&self) -> SqliteStoreOptions {
        self.options
    }

    /// Deletes documents whose native expiry is at or before `now_ms`.
    ///
    /// Returns the number of deleted documents.
    pub fn purge_expired(&self, now_ms: i64) -> StoreResult<usize> {
        let conn = self.lock()?;
        let purged = conn.execute(
            "DELETE FROM documents
             WHERE ttl_expires_at_ms IS NOT NULL
               AND ttl_expires_at_ms <= ?1;",
            [now_ms],
        )?;
        debug!("event=ttl_purge module=store status=ok backend=sqlite purged={purged}");
        Ok(purged)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        let conn = self.lock()?;
        read_document(&conn, doc)
    }

    fn run_transaction(&self, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
        let mut conn = self.lock()?;
        let max_attempts = self.options.max_transaction_attempts.max(1);

        for attempt in 1..=max_attempts {
            match run_attempt(&mut conn, body) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_conflict() => {
                    warn!(
                        "event=store_tx module=store status=conflict backend=sqlite attempt={} max_attempts={} error={}",
                        attempt, max_attempts, err
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(StoreError::ConflictRetriesExhausted {
            attempts: max_attempts,
        }
        .into())
    }

    fn server_time_seconds(&self) -> StoreResult<i64> {
        let conn = self.lock()?;
        let seconds = conn.query_row(
            "SELECT CAST(strftime('%s', 'now') AS INTEGER);",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(seconds)
    }
}

fn run_attempt(conn: &mut Connection, body: &mut TransactionBody<'_>) -> PersistenceResult<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from)?;
    body(&mut SqliteTransaction { conn: &*tx })?;
    tx.commit().map_err(StoreError::from)?;
    Ok(())
}

struct SqliteTransaction<'a> {
    conn: &'a Connection,
}

impl DocumentTransaction for SqliteTransaction<'_> {
    fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Value>> {
        read_document(self.conn, doc)
    }

    fn set(&mut self, doc: &DocumentRef, document: Value) -> StoreResult<()> {
        write_document(self.conn, doc, &document)
    }

    fn merge(&mut self, doc: &DocumentRef, fields: Map<String, Value>) -> StoreResult<()> {
        let merged = merge_document(doc, read_document(self.conn, doc)?, fields)?;
        write_document(self.conn, doc, &merged)
    }
}

fn read_document(conn: &Connection, doc: &DocumentRef) -> StoreResult<Option<Value>> {
    let data = conn
        .query_row(
            DOCUMENT_SELECT_SQL,
            params![doc.collection(), doc.name()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    match data {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| StoreError::CorruptDocument {
                document: doc.path(),
                message: err.to_string(),
            }),
        None => Ok(None),
    }
}

fn write_document(conn: &Connection, doc: &DocumentRef, document: &Value) -> StoreResult<()> {
    let data = serde_json::to_string(document)?;
    conn.execute(
        DOCUMENT_UPSERT_SQL,
        params![
            doc.collection(),
            doc.name(),
            data,
            native_expiry_millis(document),
        ],
    )?;
    Ok(())
}
