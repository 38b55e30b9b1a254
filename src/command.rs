//! The command-document type shared by `bind_session` and the commit/abort operations.
//!
//! MongoDB command documents are order-sensitive: the first key is the command verb. `bson`'s
//! [`Document`](bson::Document) preserves insertion order through merge, drop, and null-filter
//! operations, so it is reused here unchanged rather than reimplemented, per the BSON-codec
//! Non-goal.

use bson::{Bson, Document};

/// A MongoDB command document.
pub type Command = Document;

/// Inserts `key` into `doc` only if `value` is `Some`, preserving insertion order and never
/// leaving a placeholder `Bson::Null` entry behind.
pub(crate) fn insert_if_some(doc: &mut Document, key: &str, value: Option<impl Into<Bson>>) {
    if let Some(value) = value {
        doc.insert(key, value.into());
    }
}

/// Removes any key in `doc` whose value is `Bson::Null`, so the wire driver never observes
/// placeholder entries left behind by a failed merge.
pub(crate) fn strip_nulls(doc: &mut Document) {
    let null_keys: Vec<String> = doc
        .iter()
        .filter(|(_, v)| matches!(v, Bson::Null))
        .map(|(k, _)| k.clone())
        .collect();
    for key in null_keys {
        doc.remove(&key);
    }
}
