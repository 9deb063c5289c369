use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::database::{UpsertSummary, VectorStore, validate_for_upsert};
use crate::documents::Document;
use crate::{PipelineError, Result};

const UNDEFINED_TABLE: &str = "42P01";

// 13 bound columns per row keeps a full chunk well under the 65535 parameter limit
const UPSERT_CHUNK_ROWS: usize = 1000;

const INSERT_COLUMNS: &str = "INSERT INTO nba_embeddings (\
    id, entity_type, entity_id, game_id, team_id, player_id, \
    chunk_type, content_json, content_text, embedding, content_hash, \
    season, game_date) ";

// The WHERE clause makes the update conditional inside Postgres: a row whose
// stored hash already matches is neither rewritten nor has updated_at bumped.
const ON_CONFLICT: &str = " ON CONFLICT (id) DO UPDATE SET \
    entity_type = EXCLUDED.entity_type, \
    entity_id = EXCLUDED.entity_id, \
    game_id = EXCLUDED.game_id, \
    team_id = EXCLUDED.team_id, \
    player_id = EXCLUDED.player_id, \
    chunk_type = EXCLUDED.chunk_type, \
    content_json = EXCLUDED.content_json, \
    content_text = EXCLUDED.content_text, \
    embedding = EXCLUDED.embedding, \
    content_hash = EXCLUDED.content_hash, \
    season = EXCLUDED.season, \
    game_date = EXCLUDED.game_date, \
    updated_at = NOW() \
    WHERE nba_embeddings.content_hash IS DISTINCT FROM EXCLUDED.content_hash";

/// pgvector-backed document store
#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
    dimension: usize,
}

impl PgVectorStore {
    #[inline]
    pub fn new(pool: PgPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn get_existing_hashes(&self) -> Result<HashMap<String, String>> {
        let result = sqlx::query_as::<_, (String, String)>(
            "SELECT id, content_hash FROM nba_embeddings",
        )
        .fetch_all(&self.pool)
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => {
                warn!("Vector table does not exist yet, treating every document as new");
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(PipelineError::Database(format!(
                    "Failed to load content hashes: {}",
                    e
                )));
            }
        };

        debug!("Loaded {} stored content hashes", rows.len());
        Ok(rows.into_iter().collect())
    }

    async fn upsert_documents(&self, documents: &[Document]) -> Result<UpsertSummary> {
        if documents.is_empty() {
            return Ok(UpsertSummary::default());
        }

        validate_for_upsert(documents, self.dimension)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to begin transaction: {}", e)))?;

        let mut written = 0;
        for chunk in documents.chunks(UPSERT_CHUNK_ROWS) {
            let mut builder = upsert_query(chunk);
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::Database(format!("Failed to upsert documents: {}", e)))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Database(format!("Failed to commit upsert: {}", e)))?;

        info!(
            "Upserted {} documents ({} rows written)",
            documents.len(),
            written
        );

        Ok(UpsertSummary {
            submitted: documents.len(),
            written,
        })
    }
}

fn upsert_query(chunk: &[Document]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(INSERT_COLUMNS);

    builder.push_values(chunk, |mut row, doc| {
        row.push_bind(doc.id.clone())
            .push_bind(doc.entity_type.as_str())
            .push_bind(doc.entity_id.clone())
            .push_bind(doc.game_id)
            .push_bind(doc.team_id)
            .push_bind(doc.player_id)
            .push_bind(doc.chunk_type.as_str())
            .push_bind(doc.canonical_content())
            .push_unseparated("::jsonb")
            .push_bind(doc.content_text.clone())
            .push_bind(doc.embedding.clone().map(Vector::from))
            .push_bind(doc.content_hash.clone())
            .push_bind(doc.season)
            .push_bind(doc.game_date);
    });

    builder.push(ON_CONFLICT);
    builder
}

pub(crate) fn is_undefined_table(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNDEFINED_TABLE)
}
