// Embeddings module
// Embedding generation behind a small trait so the pipeline can be driven by any backend

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use ollama::OllamaClient;

/// Turns texts into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in input
/// order, each of length [`Embedder::dimension`], or fail the whole call.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}
