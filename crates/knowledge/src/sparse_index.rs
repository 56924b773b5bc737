//! Sparse lexical retrieval: BM25 over an in-RAM tantivy index.
//!
//! The index is built once per corpus snapshot. Chunks are stored in the
//! snapshot, so documents carry only the text and the chunk's ordinal.

use crate::types::Chunk;
use docchat_core::{AppError, AppResult};
use std::sync::Arc;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED,
    },
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument,
};

const ANALYZER: &str = "en_stem_lower";

/// Writer heap for the one-shot build.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Keyword search over the corpus.
pub trait SparseRetriever: Send + Sync {
    /// Top `k` chunks by lexical relevance, best first.
    fn search(&self, query: &str, k: usize) -> AppResult<Vec<Arc<Chunk>>>;
}

/// BM25 index over one corpus snapshot.
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    text_field: Field,
    ordinal_field: Field,
    chunks: Vec<Arc<Chunk>>,
}

fn index_err(e: impl std::fmt::Display) -> AppError {
    AppError::Retrieval(format!("Sparse index: {}", e))
}

impl Bm25Index {
    /// Index every chunk.
    pub fn build(chunks: &[Arc<Chunk>]) -> AppResult<Self> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(ANALYZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let text_field = schema_builder.add_text_field("text", text_options);
        let ordinal_field = schema_builder.add_u64_field("ordinal", STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index.tokenizers().register(ANALYZER, build_analyzer());

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(index_err)?;

        for (ordinal, chunk) in chunks.iter().enumerate() {
            let mut doc = TantivyDocument::default();
            doc.add_text(text_field, &chunk.text);
            doc.add_u64(ordinal_field, ordinal as u64);
            writer.add_document(doc).map_err(index_err)?;
        }

        writer.commit().map_err(index_err)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(index_err)?;

        tracing::debug!("Sparse index built over {} chunks", chunks.len());

        Ok(Self {
            index,
            reader,
            text_field,
            ordinal_field,
            chunks: chunks.to_vec(),
        })
    }
}

/// Unicode word split, long-token removal, lowercasing, English stemming.
fn build_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(100))
        .filter(LowerCaser)
        .filter(Stemmer::new(Language::English))
        .build()
}

impl SparseRetriever for Bm25Index {
    fn search(&self, query: &str, k: usize) -> AppResult<Vec<Arc<Chunk>>> {
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);

        // Rewritten queries often contain quotes, colons or brackets.
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!("Lenient query parse dropped {} fragment(s)", errors.len());
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(k))
            .map_err(index_err)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address).map_err(index_err)?;
            let ordinal = match doc.get_first(self.ordinal_field) {
                Some(OwnedValue::U64(n)) => *n as usize,
                _ => return Err(index_err("document without ordinal")),
            };
            let chunk = self
                .chunks
                .get(ordinal)
                .ok_or_else(|| index_err(format!("ordinal {} out of range", ordinal)))?;
            results.push(Arc::clone(chunk));
        }

        tracing::debug!(
            "Sparse search returned {} chunks (requested top-{})",
            results.len(),
            k
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetadataMap;

    fn corpus() -> Vec<Arc<Chunk>> {
        vec![
            Arc::new(Chunk::new(
                "1",
                "Gold loan interest rate is 10% per annum",
                MetadataMap::new(),
            )),
            Arc::new(Chunk::new(
                "2",
                "Apply for a gold loan online easily",
                MetadataMap::new(),
            )),
            Arc::new(Chunk::new(
                "3",
                "Quarterly hiring plans for the platform team",
                MetadataMap::new(),
            )),
        ]
    }

    #[test]
    fn test_build_indexes_every_chunk() {
        let index = Bm25Index::build(&corpus()).unwrap();
        assert_eq!(index.reader.searcher().num_docs(), 3);
    }

    #[test]
    fn test_search_ranks_matching_chunk_first() {
        let index = Bm25Index::build(&corpus()).unwrap();
        let results = index.search("interest rate", 2).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "1");
    }

    #[test]
    fn test_stemming_matches_inflections() {
        let index = Bm25Index::build(&corpus()).unwrap();
        let results = index.search("plan hire", 3).unwrap();
        assert_eq!(results.first().map(|c| c.id.as_str()), Some("3"));
    }

    #[test]
    fn test_result_count_bounded_by_k() {
        let index = Bm25Index::build(&corpus()).unwrap();
        assert_eq!(index.search("gold loan", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_query_syntax_characters_do_not_fail() {
        let index = Bm25Index::build(&corpus()).unwrap();
        let results = index.search("\"gold loan\" AND (rate:[ OR", 3);
        assert!(results.is_ok());
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::build(&[]).unwrap();
        assert!(index.search("anything", 5).unwrap().is_empty());
    }
}
