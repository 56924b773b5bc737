//! Pipeline configuration management.
//!
//! Everything the chat pipeline and ingestion need lives in
//! `.docchat/pipeline.yaml`. Every field has a default, so a missing file or a
//! partial file are both valid.

use crate::embeddings::EmbeddingConfig;
use docchat_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Key used to deduplicate fused candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupKey {
    /// Chunk text
    #[default]
    Content,
    /// Chunk identifier
    Id,
}

/// Which chunk attributes are aggregated over the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataInference {
    /// Fields reported as their maximum value
    #[serde(default = "default_max_fields")]
    pub max_fields: Vec<String>,

    /// Fields reported as their most frequent value
    #[serde(default = "default_mode_fields")]
    pub mode_fields: Vec<String>,
}

fn default_max_fields() -> Vec<String> {
    vec!["year".to_string()]
}

fn default_mode_fields() -> Vec<String> {
    vec!["topic".to_string()]
}

impl Default for MetadataInference {
    fn default() -> Self {
        Self {
            max_fields: default_max_fields(),
            mode_fields: default_mode_fields(),
        }
    }
}

/// Cross-encoder endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL of a `/rerank` service; without one, reranking is a pass-through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model name reported to the service
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

fn default_reranker_model() -> String {
    "BAAI/bge-reranker-base".to_string()
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_reranker_model(),
        }
    }
}

/// Chat pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Dense candidates per request
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Chunks kept after reranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Sparse candidates per request; follows `top_k` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_top_k: Option<usize>,

    /// Recent turns read from history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Budget for each LLM call
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Budget for each cross-encoder call
    #[serde(default = "default_rerank_timeout_secs")]
    pub rerank_timeout_secs: u64,

    /// Longest accepted question
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,

    #[serde(default)]
    pub dedup: DedupKey,

    #[serde(default)]
    pub metadata: MetadataInference,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,

    /// SQLite history database, relative to the workspace unless absolute
    #[serde(default = "default_history_db")]
    pub history_db: PathBuf,
}

fn default_top_k() -> usize {
    5
}

fn default_top_n() -> usize {
    3
}

fn default_history_limit() -> usize {
    5
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_rerank_timeout_secs() -> u64 {
    30
}

fn default_max_question_chars() -> usize {
    4000
}

fn default_history_db() -> PathBuf {
    PathBuf::from(".docchat").join("history.sqlite")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            top_n: default_top_n(),
            sparse_top_k: None,
            history_limit: default_history_limit(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            llm_timeout_secs: default_llm_timeout_secs(),
            rerank_timeout_secs: default_rerank_timeout_secs(),
            max_question_chars: default_max_question_chars(),
            dedup: DedupKey::default(),
            metadata: MetadataInference::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            history_db: default_history_db(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.top_k == 0 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }
        if self.top_n == 0 {
            return Err(AppError::Config("top_n must be at least 1".to_string()));
        }
        if self.sparse_top_k == Some(0) {
            return Err(AppError::Config(
                "sparse_top_k must be at least 1 when set".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_question_chars == 0 {
            return Err(AppError::Config(
                "max_question_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Sparse retrieval depth for a request retrieving `top_k` dense candidates.
    pub fn sparse_k(&self, top_k: usize) -> usize {
        self.sparse_top_k.unwrap_or(top_k)
    }

    /// Absolute path of the history database.
    pub fn history_path(&self, workspace: &Path) -> PathBuf {
        if self.history_db.is_absolute() {
            self.history_db.clone()
        } else {
            workspace.join(&self.history_db)
        }
    }
}

/// Load pipeline configuration.
///
/// Loads from `.docchat/pipeline.yaml` if it exists, otherwise returns the
/// defaults. The result is validated either way.
pub fn load_config(workspace: &Path) -> AppResult<PipelineConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded pipeline config from {:?}", config_path);
        config
    } else {
        tracing::debug!("Using default pipeline config (no config file found)");
        PipelineConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save pipeline configuration.
pub fn save_config(workspace: &Path, config: &PipelineConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    // Ensure directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved pipeline config to {:?}", config_path);
    Ok(())
}

/// Get the path to the pipeline config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".docchat").join("pipeline.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config.top_k, 5);
        assert_eq!(config.top_n, 3);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert_eq!(config.dedup, DedupKey::Content);
        assert_eq!(config.metadata.max_fields, vec!["year"]);
        assert_eq!(config.metadata.mode_fields, vec!["topic"]);
        assert!(config.reranker.endpoint.is_none());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig {
            top_k: 8,
            sparse_top_k: Some(20),
            dedup: DedupKey::Id,
            ..Default::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "top_n: 2\nreranker:\n  endpoint: http://localhost:8080\n").unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded.top_n, 2);
        assert_eq!(loaded.top_k, 5);
        assert_eq!(loaded.reranker.endpoint.as_deref(), Some("http://localhost:8080"));
        assert_eq!(loaded.reranker.model, "BAAI/bge-reranker-base");
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let config = PipelineConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_sparse_k_follows_top_k_unless_set() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.sparse_k(7), 7);
        config.sparse_top_k = Some(12);
        assert_eq!(config.sparse_k(7), 12);
    }

    #[test]
    fn test_history_path_is_workspace_relative() {
        let config = PipelineConfig::default();
        let path = config.history_path(Path::new("/srv/docs"));
        assert_eq!(path, Path::new("/srv/docs/.docchat/history.sqlite"));
    }
}
