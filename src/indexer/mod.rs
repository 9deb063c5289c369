// Indexer module
// Drives the incremental refresh: extract, build, diff, embed in batches, upsert


pub mod change;

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::{DataSource, VectorStore};
use crate::documents::{Document, DocumentBuilder, EntityType};
use crate::embeddings::Embedder;
use crate::{PipelineError, Result};

pub use change::{ChangeSet, select_changed};

pub const DEFAULT_BATCH_SIZE: usize = 128;

/// A failed entity-type pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity: EntityType,
    pub error: String,
}

/// Per-entity outcome of a full run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub counts: BTreeMap<EntityType, usize>,
    pub failures: Vec<EntityFailure>,
    /// Entity types never started because an earlier one failed
    pub skipped: Vec<EntityType>,
}

impl RunReport {
    #[inline]
    pub fn count(&self, entity: EntityType) -> usize {
        self.counts.get(&entity).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total_processed(&self) -> usize {
        self.counts.values().sum()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human readable summary, one line per entity type
    #[inline]
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .counts
            .iter()
            .map(|(entity, count)| format!("{}: {} documents processed", entity, count))
            .collect();
        lines.extend(
            self.failures
                .iter()
                .map(|failure| format!("{} failed: {}", failure.entity, failure.error)),
        );
        lines.extend(
            self.skipped
                .iter()
                .map(|entity| format!("{}: not attempted", entity)),
        );
        lines.join("\n")
    }
}

/// What a run would do for one entity type, without embedding anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityPlan {
    pub entity: EntityType,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl EntityPlan {
    #[inline]
    pub fn to_embed(&self) -> usize {
        self.new + self.modified
    }
}

impl std::fmt::Display for EntityPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} to embed ({} new, {} modified), {} unchanged",
            self.entity,
            self.to_embed(),
            self.new,
            self.modified,
            self.unchanged
        )
    }
}

/// The embedding refresh orchestrator.
///
/// Entity types run one after another. The first failure stops the run;
/// types that already finished stay committed and the rest are reported as
/// skipped. Inside one type, batches run sequentially and nothing is written
/// unless every batch succeeded.
pub struct EmbeddingPipeline {
    source: Arc<dyn DataSource>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    builder: DocumentBuilder,
    batch_size: usize,
    show_progress: bool,
}

impl EmbeddingPipeline {
    #[inline]
    pub fn new(
        source: Arc<dyn DataSource>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            source,
            embedder,
            store,
            builder: DocumentBuilder::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process every entity type in `entities`, in order, stopping at the first failure
    #[inline]
    pub async fn run(&self, entities: &[EntityType]) -> RunReport {
        info!("Starting NBA embedding pipeline");

        let mut report = RunReport::default();
        for (position, &entity) in entities.iter().enumerate() {
            match self.process_entity_type(entity).await {
                Ok(count) => {
                    report.counts.insert(entity, count);
                }
                Err(e) => {
                    error!("Processing {} failed: {}", entity, e);
                    report.counts.insert(entity, 0);
                    report.failures.push(EntityFailure {
                        entity,
                        error: e.to_string(),
                    });
                    report.skipped = entities[position + 1..].to_vec();
                    break;
                }
            }
        }

        if report.is_success() {
            info!("Pipeline completed successfully");
        } else {
            warn!(
                "Pipeline aborted, {} entity types not attempted",
                report.skipped.len()
            );
        }
        for (entity, count) in &report.counts {
            info!("{}: {} documents processed", entity, count);
        }

        report
    }

    /// Change detection only: extract, build and diff every entity type
    /// without calling the embedder or writing to the store
    #[inline]
    pub async fn plan(&self, entities: &[EntityType]) -> Result<Vec<EntityPlan>> {
        let mut plans = Vec::with_capacity(entities.len());
        for &entity in entities {
            let set = self.detect_changes(entity).await?;
            plans.push(EntityPlan {
                entity,
                new: set.new,
                modified: set.modified,
                unchanged: set.unchanged,
            });
        }
        Ok(plans)
    }

    /// Refresh one entity type and return how many rows were written
    #[inline]
    pub async fn process_entity_type(&self, entity: EntityType) -> Result<usize> {
        info!("Processing {}...", entity);

        let ChangeSet {
            mut changed,
            new,
            modified,
            unchanged,
            ..
        } = self.detect_changes(entity).await?;

        if changed.is_empty() {
            info!("No new/changed {} documents ({} unchanged)", entity, unchanged);
            return Ok(0);
        }

        info!(
            "Processing {} new/changed {} documents ({} new, {} modified, {} unchanged)",
            changed.len(),
            entity,
            new,
            modified,
            unchanged
        );

        let embeddings = self.embed_all(entity, &changed).await?;
        for (document, embedding) in changed.iter_mut().zip(embeddings) {
            document.embedding = Some(embedding);
        }

        let summary = self.store.upsert_documents(&changed).await?;
        if summary.written < summary.submitted as u64 {
            debug!(
                "{}: {} of {} rows already held the same content",
                entity,
                summary.submitted as u64 - summary.written,
                summary.submitted
            );
        }

        Ok(usize::try_from(summary.written).unwrap_or(usize::MAX))
    }

    async fn detect_changes(&self, entity: EntityType) -> Result<ChangeSet> {
        let records = self.source.fetch_records(entity).await?;
        if records.is_empty() {
            warn!("No {} data found", entity);
            return Ok(ChangeSet::default());
        }

        let documents = records
            .iter()
            .map(|record| self.builder.build(entity, record))
            .collect::<anyhow::Result<Vec<Document>>>()
            .map_err(|e| PipelineError::Document(format!("Failed to build {}: {:#}", entity, e)))?;

        let existing = self.store.get_existing_hashes().await?;
        Ok(select_changed(documents, &existing))
    }

    /// Embed every document text, batch by batch; any failed batch fails the lot
    async fn embed_all(&self, entity: EntityType, documents: &[Document]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = documents
            .iter()
            .map(|document| document.content_text.clone())
            .collect();
        let total = texts.len().div_ceil(self.batch_size);
        let bar = self.progress_bar(entity, total);

        let mut embeddings = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            let batch_number = index + 1;
            debug!(
                "Embedding {} batch {}/{} ({} texts)",
                entity,
                batch_number,
                total,
                batch.len()
            );

            let vectors = self.embedder.embed_batch(batch).await.map_err(|e| {
                PipelineError::BatchFailed {
                    entity,
                    batch: batch_number,
                    total,
                    reason: e.to_string(),
                }
            })?;

            if vectors.len() != batch.len() {
                return Err(PipelineError::BatchFailed {
                    entity,
                    batch: batch_number,
                    total,
                    reason: format!(
                        "expected {} embeddings, received {}",
                        batch.len(),
                        vectors.len()
                    ),
                });
            }

            embeddings.extend(vectors);
            bar.inc(1);
        }

        bar.finish_and_clear();
        Ok(embeddings)
    }

    fn progress_bar(&self, entity: EntityType, batches: usize) -> ProgressBar {
        if !self.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(batches as u64).with_style(style);
        bar.set_message(entity.plural());
        bar
    }
}
