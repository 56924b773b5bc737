use crate::config::MetadataInference;
use crate::types::{Chunk, MetadataMap, MetadataValue};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregate attributes over the corpus without calling the LLM.
///
/// Each `max_fields` entry reports its largest value, the first maximum
/// winning among equals. Each `mode_fields` entry reports its most frequent
/// value, ties going to the value seen first. Fields no chunk declares are
/// left out.
pub fn infer_from_corpus(chunks: &[Arc<Chunk>], fields: &MetadataInference) -> MetadataMap {
    let mut inferred = MetadataMap::new();

    for field in &fields.max_fields {
        if let Some(value) = max_value(chunks, field) {
            inferred.insert(field.clone(), value);
        }
    }

    for field in &fields.mode_fields {
        if let Some(value) = mode_value(chunks, field) {
            inferred.insert(field.clone(), value);
        }
    }

    inferred
}

fn max_value(chunks: &[Arc<Chunk>], field: &str) -> Option<MetadataValue> {
    let mut best: Option<&MetadataValue> = None;
    for value in chunks.iter().filter_map(|c| c.metadata.get(field)) {
        match best {
            Some(current) if value.compare(current) != Ordering::Greater => {}
            _ => best = Some(value),
        }
    }
    best.cloned()
}

fn mode_value(chunks: &[Arc<Chunk>], field: &str) -> Option<MetadataValue> {
    // (count, first index) per distinct value
    let mut seen: Vec<(&MetadataValue, usize)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for value in chunks.iter().filter_map(|c| c.metadata.get(field)) {
        let key = format!("{:?}", value);
        match slots.get(&key) {
            Some(&slot) => seen[slot].1 += 1,
            None => {
                slots.insert(key, seen.len());
                seen.push((value, 1));
            }
        }
    }

    let mut best: Option<(&MetadataValue, usize)> = None;
    for (value, count) in seen {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, _)| value.clone())
}
