//! SQLite layer under the document store.
//!
//! One table, `documents`, keyed by `(collection, name)`. Each row carries
//! the record JSON in `data` plus `ttl_expires_at_ms`, a copy of the native
//! expiry marker kept in its own indexed column so TTL sweeps never parse
//! JSON. Schema changes ship as numbered migrations recorded in
//! `PRAGMA user_version`; connections handed out by [`open_db`] are always
//! at the latest version.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer binary; refusing to touch it.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// SQLite gave up waiting on another writer's lock.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        )
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "documents schema v{db_version} is newer than this build (max v{latest_supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> DbError {
        DbError::Sqlite(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None))
    }

    #[test]
    fn busy_and_locked_codes_count_as_busy() {
        assert!(sqlite_failure(ffi::SQLITE_BUSY).is_busy());
        assert!(sqlite_failure(ffi::SQLITE_LOCKED).is_busy());
        assert!(!sqlite_failure(ffi::SQLITE_CONSTRAINT).is_busy());
        assert!(!DbError::UnsupportedSchemaVersion {
            db_version: 2,
            latest_supported: 1,
        }
        .is_busy());
    }
}
