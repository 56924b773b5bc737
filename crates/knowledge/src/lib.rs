//! Hybrid retrieval and history-aware answering over a document folder.
//!
//! Documents are ingested into chunks, indexed densely (embeddings) and
//! sparsely (BM25), and queried through [`ChatPipeline`], which rewrites the
//! question with history and metadata, fuses both retrievers, reranks with a
//! cross-encoder and generates the answer.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod generate;
pub mod history;
pub mod hybrid;
pub mod ingest;
pub mod metadata;
pub mod parser;
pub mod rag;
pub mod rerank;
pub mod sparse_index;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{load_config, save_config, PipelineConfig};
pub use corpus::{CorpusHandle, CorpusSnapshot};
pub use generate::Generator;
pub use history::{HistoryStore, InMemoryHistoryStore, SqliteHistoryStore};
pub use ingest::{chunks_from_folder, ingest_folder, IngestOptions, IngestReport};
pub use rag::ChatPipeline;
pub use rerank::{CrossEncoderClient, RelevanceScorer, Reranker};
pub use types::{
    Candidate, ChatAnswer, ChatRequest, Chunk, MetadataMap, MetadataValue, RankedResult,
    RetrievalSource, Role, Turn,
};

use embeddings::EmbeddingProvider;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Ingest `folder` and build a snapshot over its chunks.
///
/// A folder without any extractable text is `NoCorpus`.
pub async fn load_corpus(
    folder: &Path,
    config: &PipelineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> docchat_core::AppResult<CorpusSnapshot> {
    let start = Instant::now();

    tracing::info!("Loading documents from {}", folder.display());

    let chunks = chunks_from_folder(folder, &IngestOptions::from(config)).await?;
    if chunks.is_empty() {
        return Err(docchat_core::AppError::NoCorpus(format!(
            "no document text found in {}",
            folder.display()
        )));
    }

    let snapshot = CorpusSnapshot::build(chunks, embedder, config).await?;

    tracing::info!(
        "Corpus ready: {} chunks in {:.2}s",
        snapshot.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(snapshot)
}
