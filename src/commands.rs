use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{Database, DataSource, PgDataSource, PgVectorStore, VectorStore};
use crate::documents::EntityType;
use crate::embeddings::OllamaClient;
use crate::indexer::{EmbeddingPipeline, EntityPlan, RunReport};

/// Options for one `run` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub entities: Vec<EntityType>,
    pub skip_health_check: bool,
    pub dry_run: bool,
}

impl Default for RunOptions {
    #[inline]
    fn default() -> Self {
        Self {
            entities: EntityType::ALL.to_vec(),
            skip_health_check: false,
            dry_run: false,
        }
    }
}

/// Refresh embeddings for the selected entity types
#[inline]
pub async fn run_pipeline(config: &Config, options: &RunOptions) -> Result<RunReport> {
    let database = Database::connect(&config.database).await?;
    let dimension = config.embedding_dimension();
    database.initialize_vector_tables(dimension).await?;

    let client = OllamaClient::new(config).context("Failed to create Ollama client")?;
    if options.skip_health_check {
        warn!("Skipping embedding service health check");
    } else {
        let service = client.clone();
        tokio::task::spawn_blocking(move || service.health_check())
            .await
            .context("Health check task panicked")?
            .context("Embedding service is not ready")?;
        info!("Embedding service ready with model {}", client.model());
    }

    let pipeline = pipeline_for(&database, client, dimension)
        .with_batch_size(config.pipeline.batch_size)
        .with_progress(true);

    let report = pipeline.run(&options.entities).await;
    database.close().await;

    println!("Embedding refresh finished:");
    println!("{}", report.summary());

    Ok(report)
}

/// Report what a run would embed, without calling the embedding service or
/// writing anything
#[inline]
pub async fn plan_pipeline(config: &Config, entities: &[EntityType]) -> Result<Vec<EntityPlan>> {
    let database = Database::connect(&config.database).await?;
    let client = OllamaClient::new(config).context("Failed to create Ollama client")?;
    let pipeline = pipeline_for(&database, client, config.embedding_dimension());

    let plans = pipeline.plan(entities).await;
    database.close().await;
    let plans = plans?;

    println!("Dry run, nothing was embedded or written:");
    for plan in &plans {
        println!("{}", plan);
    }

    Ok(plans)
}

fn pipeline_for(database: &Database, client: OllamaClient, dimension: usize) -> EmbeddingPipeline {
    let source: Arc<dyn DataSource> = Arc::new(PgDataSource::new(database.pool().clone()));
    let store: Arc<dyn VectorStore> =
        Arc::new(PgVectorStore::new(database.pool().clone(), dimension));
    EmbeddingPipeline::new(source, Arc::new(client), store)
}

/// Create the pgvector extension, table and indexes
#[inline]
pub async fn init_store(config: &Config) -> Result<()> {
    let database = Database::connect(&config.database).await?;
    database
        .initialize_vector_tables(config.embedding_dimension())
        .await?;
    database.close().await;

    println!(
        "Vector table ready (dimension {})",
        config.embedding_dimension()
    );
    Ok(())
}

/// Report connectivity and stored document counts
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("Database ({}):", config.database.masked_dsn());
    match Database::connect(&config.database).await {
        Ok(database) => {
            match database.count_documents().await {
                Ok(counts) if counts.is_empty() => println!("  No documents stored yet"),
                Ok(counts) => {
                    for (entity_type, count) in counts {
                        println!("  {}: {} documents", entity_type, count);
                    }
                }
                Err(e) => println!("  Unable to count documents: {:#}", e),
            }
            database.close().await;
        }
        Err(e) => println!("  Unreachable: {:#}", e),
    }

    println!("Embedding service ({}):", config.ollama.url);
    match OllamaClient::new(config) {
        Ok(client) => {
            let model = client.model().to_string();
            let health = tokio::task::spawn_blocking(move || client.health_check())
                .await
                .context("Health check task panicked")?;
            match health {
                Ok(()) => println!("  Ready, model {} available", model),
                Err(e) => println!("  Not ready: {:#}", e),
            }
        }
        Err(e) => println!("  Misconfigured: {:#}", e),
    }

    Ok(())
}
