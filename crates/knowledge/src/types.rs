//! Domain types shared by ingestion, retrieval and the chat pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Scalar attribute value attached to a chunk or extracted from a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Convert a JSON value, dropping `null`, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }

    /// Convert a YAML value, dropping `null`, sequences, mappings and tags.
    pub fn from_yaml(value: &serde_yaml::Value) -> Option<Self> {
        match value {
            serde_yaml::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_yaml::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Numeric reading of the value; numeric strings count.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Text reading of the value, when it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Order two values: numerically when both read as numbers, lexically
    /// on their display form otherwise.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered attribute map.
pub type MetadataMap = BTreeMap<String, MetadataValue>;

/// Metadata key holding the originating file path.
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding the chunk's position within its file.
pub const POSITION_KEY: &str = "position";

/// Metadata key holding the zero-based PDF page a chunk came from.
pub const PAGE_KEY: &str = "page";

/// A unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier
    pub id: String,

    /// Text content
    pub text: String,

    /// Scalar attributes (source, position, year, topic, ...)
    #[serde(default)]
    pub metadata: MetadataMap,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, metadata: MetadataMap) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
        }
    }

    /// The `source` attribute rendered as text.
    pub fn source(&self) -> Option<String> {
        self.metadata.get(SOURCE_KEY).map(|v| v.to_string())
    }
}

/// Which back-end produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Dense,
    Sparse,
}

/// A retrieved chunk tagged with its origin.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Arc<Chunk>,
    pub source: RetrievalSource,
}

/// A chunk after reranking. `score` is `None` when scoring fell back.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub chunk: Arc<Chunk>,
    pub score: Option<f32>,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A question addressed to the chat pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub question: String,

    /// Overrides the configured retrieval depth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl ChatRequest {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            question: question.into(),
            top_k: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Sources value reported for answers produced from history alone.
pub const CHAT_HISTORY_SOURCE: &str = "chat_history";

/// Sources value for chunks without a `source` attribute.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// The pipeline's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    /// Generated answer text
    pub answer: String,

    /// `["chat_history"]`, or the source of each reranked chunk in ranked order
    pub sources: Vec<String>,

    /// Internal: whether the reranker fell back to unscored pass-through
    #[serde(skip)]
    pub rerank_fallback: bool,
}

impl ChatAnswer {
    /// True when the answer came from conversation history only.
    pub fn from_history(&self) -> bool {
        self.sources.len() == 1 && self.sources[0] == CHAT_HISTORY_SOURCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_value_from_json_keeps_scalars_only() {
        assert_eq!(
            MetadataValue::from_json(&serde_json::json!(2023)),
            Some(MetadataValue::Integer(2023))
        );
        assert_eq!(
            MetadataValue::from_json(&serde_json::json!("ml")),
            Some(MetadataValue::Text("ml".to_string()))
        );
        assert_eq!(
            MetadataValue::from_json(&serde_json::json!(0.5)),
            Some(MetadataValue::Float(0.5))
        );
        assert_eq!(MetadataValue::from_json(&serde_json::json!(null)), None);
        assert_eq!(MetadataValue::from_json(&serde_json::json!([1, 2])), None);
        assert_eq!(MetadataValue::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn test_compare_is_numeric_for_numeric_strings() {
        let a = MetadataValue::from("2023");
        let b = MetadataValue::Integer(999);
        assert_eq!(a.compare(&b), Ordering::Greater);

        // Lexical would put "9" after "10"
        let nine = MetadataValue::from("9");
        let ten = MetadataValue::from("10");
        assert_eq!(nine.compare(&ten), Ordering::Less);
    }

    #[test]
    fn test_compare_falls_back_to_lexical() {
        let a = MetadataValue::from("alpha");
        let b = MetadataValue::from("beta");
        assert_eq!(a.compare(&b), Ordering::Less);
    }

    #[test]
    fn test_metadata_value_untagged_serde() {
        let map: MetadataMap =
            serde_json::from_str(r#"{"year": 2021, "topic": "nlp", "draft": false}"#).unwrap();
        assert_eq!(map["year"], MetadataValue::Integer(2021));
        assert_eq!(map["topic"], MetadataValue::Text("nlp".to_string()));
        assert_eq!(map["draft"], MetadataValue::Bool(false));
    }

    #[test]
    fn test_chunk_source() {
        let mut metadata = MetadataMap::new();
        metadata.insert(SOURCE_KEY.to_string(), "docs/a.md".into());
        let chunk = Chunk::new("c1", "text", metadata);
        assert_eq!(chunk.source().as_deref(), Some("docs/a.md"));

        let bare = Chunk::new("c2", "text", MetadataMap::new());
        assert!(bare.source().is_none());
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::parse("system"), None);
    }
}
