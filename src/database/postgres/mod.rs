use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use crate::config::DatabaseConfig;


pub mod extractor;
pub mod vector_store;

pub use extractor::PgDataSource;
pub use vector_store::PgVectorStore;

pub const EMBEDDINGS_TABLE: &str = "nba_embeddings";

/// Owner of the shared connection pool.
///
/// Built once per process and closed explicitly at shutdown; every query
/// checks a connection out of the pool and returns it when done.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[inline]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        debug!("Connecting to {}", config.masked_dsn());

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .test_before_acquire(true)
            .connect(&config.dsn)
            .await
            .with_context(|| {
                format!(
                    "Failed to create database connection pool for {}",
                    config.masked_dsn()
                )
            })?;

        Ok(Self { pool })
    }

    #[inline]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the pgvector extension, the embeddings table and its indexes
    #[inline]
    pub async fn initialize_vector_tables(&self, dimension: usize) -> Result<()> {
        info!("Initializing vector table {}", EMBEDDINGS_TABLE);

        sqlx::raw_sql(&schema_sql(dimension))
            .execute(&self.pool)
            .await
            .context("Failed to initialize vector tables")?;

        debug!("Vector table ready with dimension {}", dimension);
        Ok(())
    }

    /// Stored document counts per entity type
    #[inline]
    pub async fn count_documents(&self) -> Result<Vec<(String, i64)>> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            "SELECT entity_type, COUNT(*) FROM nba_embeddings GROUP BY entity_type ORDER BY entity_type",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to count stored documents")?;

        Ok(counts)
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database pool closed");
    }
}

pub(crate) fn schema_sql(dimension: usize) -> String {
    format!(
        r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS nba_embeddings (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    game_id BIGINT REFERENCES games(game_id) ON DELETE CASCADE,
    team_id BIGINT REFERENCES teams(team_id) ON DELETE CASCADE,
    player_id BIGINT REFERENCES players(player_id) ON DELETE CASCADE,
    chunk_type TEXT NOT NULL,
    content_json JSONB NOT NULL,
    content_text TEXT NOT NULL,
    embedding vector({dimension}),
    season INTEGER,
    game_date DATE,
    content_hash TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_embeddings_vector
    ON nba_embeddings USING hnsw (embedding vector_l2_ops);
CREATE INDEX IF NOT EXISTS idx_embeddings_entity
    ON nba_embeddings(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_game
    ON nba_embeddings(game_id) WHERE game_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_embeddings_team
    ON nba_embeddings(team_id) WHERE team_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_embeddings_player
    ON nba_embeddings(player_id) WHERE player_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_embeddings_season
    ON nba_embeddings(season) WHERE season IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_embeddings_date
    ON nba_embeddings(game_date) WHERE game_date IS NOT NULL;
"#
    )
}
