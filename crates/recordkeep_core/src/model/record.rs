//! Persistence record model.
//!
//! # Responsibility
//! - Define the canonical document shape stored per (collection, record).
//! - Validate raw stored documents before they reach callers.
//! - Own the order-insensitive change check used by the update protocol.
//!
//! # Invariants
//! - `values` holds strings only; `expire_at` is whole epoch seconds or `None`.
//! - An absent document is equivalent to `PersistenceRecord::empty()`.
//! - Change detection never reorders the compared sequences in place.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stored field name for the opaque value list.
pub const VALUES_FIELD: &str = "u";
/// Stored field name for the logical expiry in epoch seconds.
pub const EXPIRE_AT_FIELD: &str = "expireAt";

/// Unit of persisted state addressed by (collection, record name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    /// Opaque identifiers. Order is preserved but carries no meaning.
    #[serde(rename = "u")]
    pub values: Vec<String>,
    /// Unix epoch seconds. `None` means the record never expires.
    #[serde(rename = "expireAt", default)]
    pub expire_at: Option<i64>,
}

/// Shape violations found while reading or addressing records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    NotAnObject,
    MalformedShape(String),
    NegativeExpireAt(i64),
    InvalidPathSegment {
        segment: &'static str,
        value: String,
    },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "persistence record must be a JSON object"),
            Self::MalformedShape(message) => {
                write!(f, "persistence record has invalid shape: {message}")
            }
            Self::NegativeExpireAt(value) => {
                write!(f, "expireAt must be >= 0, got {value}")
            }
            Self::InvalidPathSegment { segment, value } => {
                write!(f, "invalid {segment} name `{value}`")
            }
        }
    }
}

impl Error for RecordValidationError {}

impl PersistenceRecord {
    /// Canonical record returned for absent keys.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a non-expiring record holding `values`.
    pub fn with_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            expire_at: None,
        }
    }

    /// Parses and validates a raw stored document.
    ///
    /// Unknown top-level fields are ignored so store-native bookkeeping
    /// fields can live next to the record fields.
    ///
    /// # Errors
    /// - `NotAnObject` when the document is not a JSON object.
    /// - `MalformedShape` when `u` is missing or not an array of strings, or
    ///   when `expireAt` is neither null nor an integer.
    /// - `NegativeExpireAt` when `expireAt` is below zero.
    pub fn from_document(document: Value) -> Result<Self, RecordValidationError> {
        if !document.is_object() {
            return Err(RecordValidationError::NotAnObject);
        }

        let record: PersistenceRecord = serde_json::from_value(document)
            .map_err(|err| RecordValidationError::MalformedShape(err.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Checks invariants not expressible in the serde shape.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        match self.expire_at {
            Some(at) if at < 0 => Err(RecordValidationError::NegativeExpireAt(at)),
            _ => Ok(()),
        }
    }

    /// Serializes the record into its stored document form.
    pub fn to_document(&self) -> Value {
        json!({
            "u": self.values,
            "expireAt": self.expire_at,
        })
    }

    /// Returns whether `self` differs from `previous` as a multiset of values.
    ///
    /// Length mismatch short-circuits to `true`; otherwise sorted copies are
    /// compared element by element. `expire_at` is not compared.
    pub fn has_changed_from(&self, previous: &PersistenceRecord) -> bool {
        if self.values.len() != previous.values.len() {
            return true;
        }

        let mut current = self.values.iter().map(String::as_str).collect::<Vec<_>>();
        let mut before = previous
            .values
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        current.sort_unstable();
        before.sort_unstable();
        current != before
    }

    /// Returns whether the record has expired at `now_seconds`.
    pub fn is_expired_at(&self, now_seconds: i64) -> bool {
        matches!(self.expire_at, Some(at) if at <= now_seconds)
    }

    /// Expiry in epoch milliseconds, saturating on overflow.
    pub fn expire_at_millis(&self) -> Option<i64> {
        self.expire_at.map(|seconds| seconds.saturating_mul(1000))
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|item| item == value)
    }
}

#[cfg(test)]
mod tests {
    use super::{PersistenceRecord, RecordValidationError};
    use serde_json::json;

    #[test]
    fn reordered_values_are_unchanged() {
        let before = PersistenceRecord::with_values(["a", "b", "c"]);
        let after = PersistenceRecord::with_values(["c", "a", "b"]);
        assert!(!after.has_changed_from(&before));
        assert_eq!(after.values, vec!["c", "a", "b"]);
    }

    #[test]
    fn length_mismatch_is_a_change() {
        let before = PersistenceRecord::with_values(["a"]);
        let after = PersistenceRecord::with_values(["a", "a"]);
        assert!(after.has_changed_from(&before));
    }

    #[test]
    fn differing_multiplicities_are_a_change() {
        let before = PersistenceRecord::with_values(["a", "a", "b"]);
        let after = PersistenceRecord::with_values(["a", "b", "b"]);
        assert!(after.has_changed_from(&before));
    }

    #[test]
    fn expiry_only_edit_is_not_a_change() {
        let before = PersistenceRecord::with_values(["a"]);
        let mut after = before.clone();
        after.expire_at = Some(1_700_000_000);
        assert!(!after.has_changed_from(&before));
    }

    #[test]
    fn from_document_accepts_extra_fields_and_missing_expiry() {
        let record =
            PersistenceRecord::from_document(json!({ "u": ["x"], "expireAtTtl": 5 })).unwrap();
        assert_eq!(record, PersistenceRecord::with_values(["x"]));
    }

    #[test]
    fn from_document_rejects_bad_shapes() {
        let missing = PersistenceRecord::from_document(json!({ "expireAt": null })).unwrap_err();
        assert!(matches!(missing, RecordValidationError::MalformedShape(_)));

        let numbers = PersistenceRecord::from_document(json!({ "u": [1, 2] })).unwrap_err();
        assert!(matches!(numbers, RecordValidationError::MalformedShape(_)));

        let fractional =
            PersistenceRecord::from_document(json!({ "u": [], "expireAt": 1.5 })).unwrap_err();
        assert!(matches!(fractional, RecordValidationError::MalformedShape(_)));

        let scalar = PersistenceRecord::from_document(json!("u")).unwrap_err();
        assert_eq!(scalar, RecordValidationError::NotAnObject);

        let negative =
            PersistenceRecord::from_document(json!({ "u": [], "expireAt": -1 })).unwrap_err();
        assert_eq!(negative, RecordValidationError::NegativeExpireAt(-1));
    }

    #[test]
    fn document_uses_wire_field_names() {
        let mut record = PersistenceRecord::with_values(["a"]);
        record.expire_at = Some(42);
        assert_eq!(record.to_document(), json!({ "u": ["a"], "expireAt": 42 }));
        assert_eq!(record.expire_at_millis(), Some(42_000));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let mut record = PersistenceRecord::empty();
        assert!(!record.is_expired_at(i64::MAX));
        record.expire_at = Some(100);
        assert!(!record.is_expired_at(99));
        assert!(record.is_expired_at(100));
    }
}
