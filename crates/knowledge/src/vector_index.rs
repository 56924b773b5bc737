//! Dense retrieval over an in-memory vector index.

use crate::embeddings::EmbeddingProvider;
use crate::types::Chunk;
use async_trait::async_trait;
use docchat_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Nearest-neighbour search by meaning.
#[async_trait]
pub trait DenseRetriever: Send + Sync {
    /// Top `k` chunks by similarity to `query`, most similar first.
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<Arc<Chunk>>>;
}

/// Exhaustive cosine-similarity index over one corpus snapshot.
///
/// Chunks are embedded once at build time. Queries are embedded per call,
/// bounded by `timeout`.
pub struct VectorIndex {
    entries: Vec<(Arc<Chunk>, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl VectorIndex {
    /// Embed every chunk and build the index.
    pub async fn build(
        chunks: &[Arc<Chunk>],
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        tracing::info!(
            "Embedding {} chunks using provider '{}' (model: {})",
            texts.len(),
            embedder.provider_name(),
            embedder.model_name()
        );

        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&texts).await?
        };

        if embeddings.len() != chunks.len() {
            return Err(AppError::Embedding(format!(
                "Provider returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        Ok(Self::from_embeddings(
            chunks.iter().cloned().zip(embeddings).collect(),
            embedder,
            timeout,
        ))
    }

    /// Build from precomputed vectors.
    pub fn from_embeddings(
        entries: Vec<(Arc<Chunk>, Vec<f32>)>,
        embedder: Arc<dyn EmbeddingProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            entries,
            embedder,
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` entries by cosine similarity to `query_embedding`.
    ///
    /// Equal scores keep corpus order.
    pub fn search_by_vector(&self, query_embedding: &[f32], k: usize) -> Vec<(Arc<Chunk>, f32)> {
        let mut results: Vec<(Arc<Chunk>, f32)> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| (Arc::clone(chunk), cosine_similarity(query_embedding, embedding)))
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }
}

#[async_trait]
impl DenseRetriever for VectorIndex {
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<Arc<Chunk>>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = tokio::time::timeout(self.timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "Query embedding exceeded {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let results = self.search_by_vector(&query_embedding, k);

        tracing::debug!(
            "Dense search returned {} chunks (requested top-{}, best score {:.3})",
            results.len(),
            k,
            results.first().map(|(_, s)| *s).unwrap_or(0.0)
        );

        Ok(results.into_iter().map(|(chunk, _)| chunk).collect())
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use crate::types::MetadataMap;

    fn chunk(id: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(id, text, MetadataMap::new()))
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(TrigramProvider::new(256))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_search_by_vector_orders_by_similarity() {
        let index = VectorIndex::from_embeddings(
            vec![
                (chunk("far", "far"), vec![-1.0, 0.2]),
                (chunk("near", "near"), vec![0.9, 0.1]),
                (chunk("mid", "mid"), vec![0.5, 0.5]),
            ],
            embedder(),
            Duration::from_secs(1),
        );

        let results = index.search_by_vector(&[1.0, 0.0], 2);
        let ids: Vec<&str> = results.iter().map(|(c, _)| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        let index = VectorIndex::from_embeddings(
            vec![
                (chunk("a", "a"), vec![1.0, 0.0]),
                (chunk("b", "b"), vec![1.0, 0.0]),
            ],
            embedder(),
            Duration::from_secs(1),
        );

        let results = index.search_by_vector(&[1.0, 0.0], 2);
        assert_eq!(results[0].0.id, "a");
        assert_eq!(results[1].0.id, "b");
    }

    #[tokio::test]
    async fn test_similarity_search_with_trigram_embedder() {
        let chunks = vec![
            chunk("pasta", "Cooking recipes for fresh pasta and sauces"),
            chunk("rust", "Rust ownership and borrowing rules explained"),
        ];
        let index = VectorIndex::build(&chunks, embedder(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(index.len(), 2);
        let results = index.similarity_search("borrowing rules in rust", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "rust");
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = VectorIndex::build(&[], embedder(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(index.is_empty());
        assert!(index.similarity_search("anything", 3).await.unwrap().is_empty());
    }
}
