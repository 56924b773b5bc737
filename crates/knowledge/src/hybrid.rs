//! Hybrid retrieval: dense and sparse candidates fused into one set.

use crate::config::DedupKey;
use crate::corpus::CorpusSnapshot;
use crate::types::{Candidate, Chunk, RetrievalSource};
use docchat_core::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Runs both back-ends of a snapshot and fuses their results.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridRetriever {
    dedup: DedupKey,
}

impl HybridRetriever {
    pub fn new(dedup: DedupKey) -> Self {
        Self { dedup }
    }

    /// Dense top `top_k` and sparse top `sparse_k`, searched concurrently.
    ///
    /// The sparse search is synchronous and runs on the blocking pool. Either
    /// back-end failing fails the whole retrieval.
    pub async fn retrieve(
        &self,
        snapshot: &CorpusSnapshot,
        query: &str,
        top_k: usize,
        sparse_k: usize,
    ) -> AppResult<Vec<Candidate>> {
        let dense = snapshot.dense.similarity_search(query, top_k);
        let sparse_index = Arc::clone(&snapshot.sparse);
        let sparse_query = query.to_string();
        let sparse = async move {
            tokio::task::spawn_blocking(move || sparse_index.search(&sparse_query, sparse_k))
                .await
                .map_err(|e| AppError::Retrieval(format!("Sparse search task failed: {}", e)))?
        };

        let (dense, sparse) = tokio::try_join!(dense, sparse)?;

        tracing::debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            "Retrieved candidates"
        );

        Ok(fuse(dense, sparse, self.dedup))
    }
}

/// Dense results then sparse results, each distinct key kept once.
///
/// The first occurrence wins, so a chunk found by both back-ends keeps its
/// dense position and source.
pub fn fuse(dense: Vec<Arc<Chunk>>, sparse: Vec<Arc<Chunk>>, dedup: DedupKey) -> Vec<Candidate> {
    let tagged = dense
        .into_iter()
        .map(|chunk| (chunk, RetrievalSource::Dense))
        .chain(sparse.into_iter().map(|chunk| (chunk, RetrievalSource::Sparse)));

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for (chunk, source) in tagged {
        let key = match dedup {
            DedupKey::Content => chunk.text.clone(),
            DedupKey::Id => chunk.id.clone(),
        };
        if seen.insert(key) {
            candidates.push(Candidate { chunk, source });
        }
    }

    candidates
}
