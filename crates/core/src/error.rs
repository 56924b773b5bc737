//! Error types for docchat.
//!
//! A single error enum covers every failure category in the workspace:
//! configuration, I/O, the LLM and embedding collaborators, retrieval,
//! reranking, chat history, ingestion, prompts and input validation.

use thiserror::Error;

/// Unified error type for docchat.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Request-fatal failures reach the caller as one of these variants; local
/// failures with a defined fallback are logged and never surface here.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Dense or sparse retrieval back-end errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Cross-encoder scoring errors
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Chat history store errors
    #[error("History error: {0}")]
    History(String),

    /// Document loading and chunking errors
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Rejected request input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A chat request arrived before any corpus was loaded
    #[error("No documents loaded: {0}")]
    NoCorpus(String),

    /// A collaborator call exceeded its time budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable, machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Llm(_) => "llm",
            AppError::Embedding(_) => "embedding",
            AppError::Retrieval(_) => "retrieval",
            AppError::Rerank(_) => "rerank",
            AppError::History(_) => "history",
            AppError::Ingestion(_) => "ingestion",
            AppError::Prompt(_) => "prompt",
            AppError::Validation(_) => "validation",
            AppError::NoCorpus(_) => "no_corpus",
            AppError::Timeout(_) => "timeout",
            AppError::Serialization(_) => "serialization",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
