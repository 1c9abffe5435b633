//! Document addressing.

use crate::model::record::RecordValidationError;
use std::fmt::{Display, Formatter};

/// Resolved (collection, record) address understood by every store adapter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentRef {
    collection: String,
    name: String,
}

impl DocumentRef {
    /// Composes a document reference. Pure; never touches a store.
    ///
    /// # Errors
    /// - `InvalidPathSegment` when either segment is empty, contains `/`,
    ///   or is `.`/`..`.
    pub fn new(collection: &str, name: &str) -> Result<Self, RecordValidationError> {
        validate_segment("collection", collection)?;
        validate_segment("record", name)?;
        Ok(Self {
            collection: collection.to_string(),
            name: name.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slash-joined path, used in logs and error messages.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.name)
    }
}

impl Display for DocumentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.name)
    }
}

fn validate_segment(segment: &'static str, value: &str) -> Result<(), RecordValidationError> {
    if value.is_empty() || value == "." || value == ".." || value.contains('/') {
        return Err(RecordValidationError::InvalidPathSegment {
            segment,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::DocumentRef;
    use crate::model::record::RecordValidationError;

    #[test]
    fn composes_collection_and_record() {
        let doc = DocumentRef::new("limits", "user-1").expect("valid ref");
        assert_eq!(doc.collection(), "limits");
        assert_eq!(doc.name(), "user-1");
        assert_eq!(doc.path(), "limits/user-1");
        assert_eq!(doc.to_string(), "limits/user-1");
    }

    #[test]
    fn rejects_unaddressable_segments() {
        for (collection, name) in [("", "a"), ("a", ""), ("a/b", "c"), ("a", ".."), (".", "x")] {
            let err = DocumentRef::new(collection, name).expect_err("segment should be rejected");
            assert!(matches!(
                err,
                RecordValidationError::InvalidPathSegment { .. }
            ));
        }
    }
}
