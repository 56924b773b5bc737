//! Per-request orchestration types.

use crate::types::MetadataMap;

/// Outcome of asking whether history alone can answer a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryGate {
    HistoryAnswerable,
    NeedsRetrieval,
}

impl HistoryGate {
    /// Classify the LLM's reply. Only an exact "yes" after normalization
    /// skips retrieval.
    pub fn from_reply(reply: &str) -> Self {
        if normalize_reply(reply) == "yes" {
            Self::HistoryAnswerable
        } else {
            Self::NeedsRetrieval
        }
    }
}

/// Trim, drop trailing punctuation and lower-case.
pub fn normalize_reply(reply: &str) -> String {
    reply
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase()
}

/// Scratch state for one question as it moves through the pipeline.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub raw_question: String,
    pub enhanced_query: String,
    pub rewritten_query: String,
    pub final_query: String,
    pub metadata: MetadataMap,
    pub top_k: usize,
    pub top_n: usize,
}

impl QueryContext {
    pub fn new(question: &str, top_k: usize, top_n: usize) -> Self {
        Self {
            raw_question: question.to_string(),
            enhanced_query: question.to_string(),
            rewritten_query: question.to_string(),
            final_query: question.to_string(),
            metadata: MetadataMap::new(),
            top_k,
            top_n,
        }
    }
}
