//! Immutable corpus snapshots and the handle that publishes them.
//!
//! A snapshot bundles the chunks, both retrieval indices and the corpus-wide
//! metadata. Reloading builds a whole new snapshot before swapping it in, so a
//! request sees one consistent corpus from start to finish.

use crate::config::PipelineConfig;
use crate::embeddings::EmbeddingProvider;
use crate::metadata::infer_from_corpus;
use crate::sparse_index::{Bm25Index, SparseRetriever};
use crate::types::{Chunk, MetadataMap};
use crate::vector_index::{DenseRetriever, VectorIndex};
use docchat_core::{AppError, AppResult};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// One loaded corpus with its indices.
pub struct CorpusSnapshot {
    pub chunks: Vec<Arc<Chunk>>,
    pub dense: Arc<dyn DenseRetriever>,
    pub sparse: Arc<dyn SparseRetriever>,

    /// Aggregates inferred once at build time
    pub corpus_metadata: MetadataMap,
}

impl std::fmt::Debug for CorpusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorpusSnapshot")
            .field("chunks", &self.chunks.len())
            .field("corpus_metadata", &self.corpus_metadata)
            .finish_non_exhaustive()
    }
}

impl CorpusSnapshot {
    /// Assemble a snapshot from prebuilt parts.
    pub fn new(
        chunks: Vec<Arc<Chunk>>,
        dense: Arc<dyn DenseRetriever>,
        sparse: Arc<dyn SparseRetriever>,
        corpus_metadata: MetadataMap,
    ) -> Self {
        Self {
            chunks,
            dense,
            sparse,
            corpus_metadata,
        }
    }

    /// Embed and index `chunks`.
    ///
    /// The BM25 index is built on a blocking thread while embeddings are
    /// computed.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &PipelineConfig,
    ) -> AppResult<Self> {
        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().map(Arc::new).collect();
        let embed_timeout = Duration::from_secs(config.embedding.timeout_secs);

        let sparse_chunks = chunks.clone();
        let sparse_task = tokio::task::spawn_blocking(move || Bm25Index::build(&sparse_chunks));
        let dense = VectorIndex::build(&chunks, embedder, embed_timeout).await?;
        let sparse = sparse_task
            .await
            .map_err(|e| AppError::Retrieval(format!("Sparse index build task failed: {}", e)))??;

        let corpus_metadata = infer_from_corpus(&chunks, &config.metadata);

        tracing::info!(
            chunks = chunks.len(),
            metadata = %crate::metadata::render(&corpus_metadata),
            "Corpus snapshot built"
        );

        Ok(Self::new(
            chunks,
            Arc::new(dense),
            Arc::new(sparse),
            corpus_metadata,
        ))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Holder of the active snapshot.
#[derive(Default)]
pub struct CorpusHandle {
    current: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl CorpusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: CorpusSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// Publish `snapshot`, returning the one it replaces.
    pub fn swap(&self, snapshot: CorpusSnapshot) -> Option<Arc<CorpusSnapshot>> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        guard.replace(Arc::new(snapshot))
    }

    /// The active snapshot, or `NoCorpus` before the first load.
    pub fn current(&self) -> AppResult<Arc<CorpusSnapshot>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or_else(|| {
            AppError::NoCorpus("load a document folder before asking questions".to_string())
        })
    }
}
