//! Text chunking with configurable size and overlap.

use crate::types::{Chunk, MetadataMap, MetadataValue, POSITION_KEY, SOURCE_KEY};
use sha2::{Digest, Sha256};

/// Stable chunk identifier derived from where the text came from and what it says.
pub fn chunk_id(source: &str, position: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(position.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunk text into overlapping windows of `chunk_size` characters.
///
/// Consecutive windows share `overlap` characters. Every character of the
/// input lands in at least one chunk. Each chunk inherits `base_metadata`
/// and gets `source` and `position` on top of it.
pub fn chunk_text(
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
    base_metadata: &MetadataMap,
) -> Vec<Chunk> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    if char_count == 0 || chunk_size == 0 {
        return vec![];
    }

    let step = if chunk_size > overlap {
        chunk_size - overlap
    } else {
        chunk_size
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(char_count);
        let window = text[boundaries[start]..boundaries[end]].trim();

        if !window.is_empty() {
            let position = chunks.len();
            let mut metadata = base_metadata.clone();
            metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(source));
            metadata.insert(
                POSITION_KEY.to_string(),
                MetadataValue::Integer(position as i64),
            );

            chunks.push(Chunk::new(
                chunk_id(source, position, window),
                window,
                metadata,
            ));
        }

        if end == char_count {
            break;
        }
        start += step;
    }

    tracing::debug!(
        "Chunked {} into {} chunks (size: {}, overlap: {})",
        source,
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}
