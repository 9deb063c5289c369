// Database module
// Postgres source extraction, the pgvector-backed store, and an in-memory store

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::Result;
use crate::documents::{Document, EntityType, Record};

pub use memory::MemoryVectorStore;
pub use postgres::{Database, PgDataSource, PgVectorStore};

/// Result of one upsert call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertSummary {
    /// Documents handed to the store
    pub submitted: usize,
    /// Rows actually inserted or updated
    pub written: u64,
}

/// Persistence target for embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Map of every stored document id to its content hash
    async fn get_existing_hashes(&self) -> Result<HashMap<String, String>>;

    /// Insert new ids, update existing ids whose stored hash differs, leave
    /// the rest untouched. All rows of one call commit together or not at all.
    async fn upsert_documents(&self, documents: &[Document]) -> Result<UpsertSummary>;
}

/// Supplier of raw source records, one ordered list per entity type.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_records(&self, entity: EntityType) -> Result<Vec<Record>>;
}

/// Checks shared by every store before anything is written
pub(crate) fn validate_for_upsert(documents: &[Document], dimension: usize) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(documents.len());
    for document in documents {
        document
            .check_writable(dimension)
            .map_err(crate::PipelineError::Document)?;
        if !seen.insert(document.id.as_str()) {
            return Err(crate::PipelineError::Document(format!(
                "Document {} appears more than once in one upsert",
                document.id
            )));
        }
    }
    Ok(())
}
