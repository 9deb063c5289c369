#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::database::{UpsertSummary, VectorStore, validate_for_upsert};
use crate::documents::Document;
use crate::{PipelineError, Result};

#[derive(Debug, Clone)]
struct StoredRow {
    content_hash: String,
    document: Option<Document>,
    revision: u32,
    updated_at: DateTime<Utc>,
}

/// In-memory store with the same conditional upsert rules as the pgvector store.
///
/// Backs the pipeline tests. `with_hashes` seeds it with previously stored
/// hashes.
#[derive(Debug)]
pub struct MemoryVectorStore {
    rows: Mutex<HashMap<String, StoredRow>>,
    dimension: usize,
    upsert_calls: AtomicUsize,
    fail_next_upsert: AtomicBool,
}

impl MemoryVectorStore {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            dimension,
            upsert_calls: AtomicUsize::new(0),
            fail_next_upsert: AtomicBool::new(false),
        }
    }

    /// Start from known hashes without their documents
    #[inline]
    pub fn with_hashes(dimension: usize, hashes: HashMap<String, String>) -> Self {
        let now = Utc::now();
        let rows = hashes
            .into_iter()
            .map(|(id, content_hash)| {
                let row = StoredRow {
                    content_hash,
                    document: None,
                    revision: 0,
                    updated_at: now,
                };
                (id, row)
            })
            .collect();

        Self {
            rows: Mutex::new(rows),
            ..Self::new(dimension)
        }
    }

    fn rows(&self) -> MutexGuard<'_, HashMap<String, StoredRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.rows().get(id).and_then(|row| row.document.clone())
    }

    /// Number of times the row was inserted or updated
    #[inline]
    pub fn revision(&self, id: &str) -> Option<u32> {
        self.rows().get(id).map(|row| row.revision)
    }

    #[inline]
    pub fn updated_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.rows().get(id).map(|row| row.updated_at)
    }

    #[inline]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Make the next upsert fail before anything is applied
    #[inline]
    pub fn fail_next_upsert(&self) {
        self.fail_next_upsert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn get_existing_hashes(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .rows()
            .iter()
            .map(|(id, row)| (id.clone(), row.content_hash.clone()))
            .collect())
    }

    async fn upsert_documents(&self, documents: &[Document]) -> Result<UpsertSummary> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_next_upsert.swap(false, Ordering::SeqCst) {
            return Err(PipelineError::Database(
                "Simulated upsert failure".to_string(),
            ));
        }

        validate_for_upsert(documents, self.dimension)?;

        // Validation happened up front, so applying under one lock is all-or-nothing
        let mut rows = self.rows();
        let now = Utc::now();
        let mut written = 0;

        for document in documents {
            match rows.get_mut(&document.id) {
                Some(row) if row.content_hash == document.content_hash => {}
                Some(row) => {
                    row.content_hash = document.content_hash.clone();
                    row.document = Some(document.clone());
                    row.revision += 1;
                    row.updated_at = now;
                    written += 1;
                }
                None => {
                    rows.insert(
                        document.id.clone(),
                        StoredRow {
                            content_hash: document.content_hash.clone(),
                            document: Some(document.clone()),
                            revision: 1,
                            updated_at: now,
                        },
                    );
                    written += 1;
                }
            }
        }

        Ok(UpsertSummary {
            submitted: documents.len(),
            written,
        })
    }
}
