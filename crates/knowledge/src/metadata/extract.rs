use crate::generate::Generator;
use crate::types::{MetadataMap, MetadataValue};
use docchat_core::AppResult;
use docchat_prompt::{ids, PromptLibrary};
use std::collections::HashMap;
use std::sync::Arc;

/// Pulls structured attributes out of a query with the LLM.
#[derive(Clone)]
pub struct MetadataExtractor {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
}

impl MetadataExtractor {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>) -> Self {
        Self { generator, prompts }
    }

    /// Ask the LLM for the query's attributes.
    ///
    /// A reply that is not a JSON object gives an empty map. A failed or
    /// timed-out LLM call is returned as an error.
    pub async fn extract_from_query(&self, query: &str) -> AppResult<MetadataMap> {
        let prompt = self.prompts.render(
            ids::METADATA_EXTRACT,
            HashMap::from([("query".to_string(), query.to_string())]),
        )?;

        let reply = self.generator.complete(prompt).await?;
        Ok(parse_metadata_reply(&reply))
    }
}

/// Parse an LLM reply as a flat JSON object of scalars.
///
/// Code fences are stripped. Non-scalar values are dropped. Anything that is
/// not a JSON object yields an empty map and an error log.
pub fn parse_metadata_reply(reply: &str) -> MetadataMap {
    let body = strip_code_fence(reply);

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Metadata reply is not valid JSON; using no query metadata");
            return MetadataMap::new();
        }
    };

    let Some(object) = value.as_object() else {
        tracing::error!("Metadata reply is not a JSON object; using no query metadata");
        return MetadataMap::new();
    };

    object
        .iter()
        .filter_map(|(key, value)| MetadataValue::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let map = parse_metadata_reply(r#"{"year": 2023, "topic": "ml"}"#);
        assert_eq!(map["year"], MetadataValue::Integer(2023));
        assert_eq!(map["topic"], MetadataValue::from("ml"));
    }

    #[test]
    fn test_parse_fenced_object() {
        let map = parse_metadata_reply("```json\n{\"location\": \"Paris\"}\n```");
        assert_eq!(map["location"], MetadataValue::from("Paris"));

        let bare = parse_metadata_reply("```\n{\"year\": 2020}\n```\n");
        assert_eq!(bare["year"], MetadataValue::Integer(2020));
    }

    #[test]
    fn test_non_scalars_are_dropped() {
        let map = parse_metadata_reply(r#"{"year": 2023, "tags": ["a"], "extra": {"x": 1}, "none": null}"#);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("year"));
    }

    #[test]
    fn test_malformed_reply_is_empty() {
        assert!(parse_metadata_reply("The year is 2023").is_empty());
        assert!(parse_metadata_reply("[1, 2, 3]").is_empty());
        assert!(parse_metadata_reply("").is_empty());
    }
}
