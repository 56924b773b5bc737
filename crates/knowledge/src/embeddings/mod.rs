//! Text embedding providers.
//!
//! Dense retrieval embeds every chunk once per corpus snapshot and the query
//! once per request, both through the same `EmbeddingProvider`.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
