//! Assembly of a chat pipeline from workspace configuration.

use docchat_core::{config::AppConfig, AppResult};
use docchat_knowledge::config::get_config_path;
use docchat_knowledge::embeddings::{create_provider, EmbeddingProvider};
use docchat_knowledge::{
    load_config, load_corpus, save_config, ChatPipeline, CorpusHandle, Generator, PipelineConfig, Reranker,
    SqliteHistoryStore,
};
use docchat_llm::create_client;
use docchat_prompt::PromptLibrary;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A loaded corpus and the pipeline that answers over it.
pub struct Session {
    pub pipeline: ChatPipeline,
    docs: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Session {
    /// Load the document folder and wire every collaborator.
    pub async fn open(config: &AppConfig, docs: &Path) -> AppResult<Self> {
        config.validate()?;
        config.ensure_docchat_dir()?;

        let pipeline_config = load_config(&config.workspace)?;
        if !get_config_path(&config.workspace).exists() {
            // Leave an editable copy of the defaults in the workspace.
            save_config(&config.workspace, &pipeline_config)?;
        }

        let embedder = create_provider(&pipeline_config.embedding).await?;

        let snapshot = load_corpus(docs, &pipeline_config, Arc::clone(&embedder)).await?;
        let corpus = Arc::new(CorpusHandle::with_snapshot(snapshot));

        let generator = build_generator(config, &pipeline_config)?;
        let prompts = Arc::new(PromptLibrary::load(&config.workspace)?);
        let reranker = Reranker::from_config(
            &pipeline_config.reranker,
            Duration::from_secs(pipeline_config.rerank_timeout_secs),
        )?;
        let history = Arc::new(SqliteHistoryStore::open(
            &pipeline_config.history_path(&config.workspace),
        )?);

        let pipeline =
            ChatPipeline::new(corpus, generator, prompts, reranker, history, pipeline_config);

        Ok(Self {
            pipeline,
            docs: docs.to_path_buf(),
            embedder,
        })
    }

    /// Re-ingest the document folder and swap the new corpus in.
    pub async fn reload(&self) -> AppResult<usize> {
        let snapshot =
            load_corpus(&self.docs, self.pipeline.config(), Arc::clone(&self.embedder)).await?;
        let chunks = snapshot.len();
        self.pipeline.corpus().swap(snapshot);
        Ok(chunks)
    }
}

fn build_generator(config: &AppConfig, pipeline_config: &PipelineConfig) -> AppResult<Generator> {
    let provider_config = config.get_provider_config(&config.provider);
    let endpoint = provider_config.and_then(|pc| pc.endpoint());
    let timeout = Duration::from_secs(
        provider_config
            .and_then(|pc| pc.timeout_secs())
            .unwrap_or(pipeline_config.llm_timeout_secs),
    );
    let api_key = config.resolve_api_key(&config.provider);

    let client = create_client(&config.provider, endpoint, api_key.as_deref(), Some(timeout))?;

    tracing::debug!(
        provider = %config.provider,
        model = %config.model,
        "LLM client ready"
    );

    Ok(Generator::new(
        client,
        config.model.clone(),
        Duration::from_secs(pipeline_config.llm_timeout_secs),
    ))
}
