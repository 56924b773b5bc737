//! Metadata fusion.
//!
//! Attributes come from two places: the LLM reads them out of the query, and
//! the corpus supplies aggregates (latest year, dominant topic). The two are
//! merged with the query winning on shared keys.

mod extract;
mod infer;

pub use extract::{parse_metadata_reply, MetadataExtractor};
pub use infer::infer_from_corpus;

use crate::types::MetadataMap;

/// Overlay `query` on top of `corpus`.
pub fn combine(query: &MetadataMap, corpus: &MetadataMap) -> MetadataMap {
    let mut combined = corpus.clone();
    for (key, value) in query {
        combined.insert(key.clone(), value.clone());
    }
    combined
}

/// Compact JSON rendering used inside prompts.
pub fn render(metadata: &MetadataMap) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}
