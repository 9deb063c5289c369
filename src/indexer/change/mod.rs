
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::documents::Document;

/// Outcome of comparing freshly built documents with stored hashes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    /// Documents that need embedding, in input order
    pub changed: Vec<Document>,
    /// Ids not present in the store
    pub new: usize,
    /// Ids present with a different hash
    pub modified: usize,
    /// Ids present with the same hash
    pub unchanged: usize,
    /// Repeated ids dropped after their first occurrence
    pub duplicates: usize,
}

impl ChangeSet {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Select the documents whose id is unknown or whose content hash moved.
///
/// Pure and order preserving. A repeated id keeps only its first occurrence,
/// since a single upsert cannot write the same row twice.
#[inline]
pub fn select_changed(documents: Vec<Document>, existing: &HashMap<String, String>) -> ChangeSet {
    let mut set = ChangeSet::default();
    let mut seen = HashSet::with_capacity(documents.len());

    for document in documents {
        if !seen.insert(document.id.clone()) {
            warn!("Skipping duplicate document id {}", document.id);
            set.duplicates += 1;
            continue;
        }

        match existing.get(&document.id) {
            None => {
                set.new += 1;
                set.changed.push(document);
            }
            Some(hash) if *hash != document.content_hash => {
                set.modified += 1;
                set.changed.push(document);
            }
            Some(_) => set.unchanged += 1,
        }
    }

    set
}
