//! Change classification against the destination and the previous sync state.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use super::flatten::content_hash;
use crate::core::Document;
use crate::state::SyncState;

/// Classification of one document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    New,
    Updated,
    Unchanged,
    Deleted,
}

/// A source document identified by key, with its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub id: String,
    pub hash: String,
    /// Position of the document in the fetched batch.
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub id: String,
    pub kind: ChangeKind,
    /// Content hash; `None` for deletions.
    pub hash: Option<String>,
    /// Position of the source document; `None` for deletions.
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub is_full_sync: bool,
    pub changes: Vec<Change>,
}

impl ChangeSet {
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind == kind).count()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(move |c| c.kind == kind)
    }

    pub fn kind_of(&self, id: &str) -> Option<ChangeKind> {
        self.changes.iter().find(|c| c.id == id).map(|c| c.kind)
    }
}

/// Key and hash every document.
///
/// Documents without a usable key are skipped; for duplicate ids the first
/// occurrence wins. Returns the entries and one message per skipped document.
pub fn key_documents(docs: &[Document], key_field: &str) -> (Vec<SourceEntry>, Vec<String>) {
    let mut seen = HashSet::with_capacity(docs.len());
    let mut entries = Vec::with_capacity(docs.len());
    let mut skipped = Vec::new();

    for (index, doc) in docs.iter().enumerate() {
        let Some(id) = doc.key_string(key_field) else {
            let msg = format!(
                "document at position {} has no usable '{}' value, skipped",
                index, key_field
            );
            warn!("{}", msg);
            skipped.push(msg);
            continue;
        };
        if !seen.insert(id.clone()) {
            let msg = format!("duplicate id '{}' at position {}, skipped", id, index);
            warn!("{}", msg);
            skipped.push(msg);
            continue;
        }
        entries.push(SourceEntry {
            hash: content_hash(doc),
            id,
            index,
        });
    }

    (entries, skipped)
}

/// Classify source entries and destination ids.
///
/// Without prior state, or when `force` is set, every id already in the
/// destination is treated as Updated.
pub fn detect_changes(
    source: &[SourceEntry],
    dest_ids: &HashSet<String>,
    prior: Option<&SyncState>,
    force: bool,
) -> ChangeSet {
    let prior = if force { None } else { prior };
    let is_full_sync = prior.is_none();

    let mut changes = Vec::with_capacity(source.len());
    for entry in source {
        let kind = if !dest_ids.contains(&entry.id) {
            ChangeKind::New
        } else {
            match prior.and_then(|p| p.hash_for(&entry.id)) {
                Some(old) if old == entry.hash => ChangeKind::Unchanged,
                _ => ChangeKind::Updated,
            }
        };
        changes.push(Change {
            id: entry.id.clone(),
            kind,
            hash: Some(entry.hash.clone()),
            index: Some(entry.index),
        });
    }

    let source_ids: HashSet<&str> = source.iter().map(|e| e.id.as_str()).collect();
    let mut deleted: Vec<&String> = dest_ids
        .iter()
        .filter(|id| !source_ids.contains(id.as_str()))
        .collect();
    deleted.sort();
    changes.extend(deleted.into_iter().map(|id| Change {
        id: id.clone(),
        kind: ChangeKind::Deleted,
        hash: None,
        index: None,
    }));

    ChangeSet {
        is_full_sync,
        changes,
    }
}
