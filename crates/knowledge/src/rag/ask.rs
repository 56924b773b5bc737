//! The chat pipeline.
//!
//! Per question:
//! 1. Ask whether the recent history already answers it; if so, answer from
//!    history alone.
//! 2. Otherwise enhance the question with history, fuse query and corpus
//!    metadata, rewrite the query twice (for retrieval, then with metadata).
//! 3. Retrieve dense and sparse candidates, rerank, generate the answer.
//! 4. Record the question and answer in history.

use crate::config::PipelineConfig;
use crate::corpus::{CorpusHandle, CorpusSnapshot};
use crate::generate::Generator;
use crate::history::HistoryStore;
use crate::hybrid::HybridRetriever;
use crate::metadata::{self, MetadataExtractor};
use crate::rag::types::{HistoryGate, QueryContext};
use crate::rerank::Reranker;
use crate::types::{
    ChatAnswer, ChatRequest, RankedResult, Role, Turn, CHAT_HISTORY_SOURCE, UNKNOWN_SOURCE,
};
use docchat_core::{AppError, AppResult};
use docchat_prompt::{ids, PromptLibrary};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Longest accepted user or conversation id.
const MAX_ID_CHARS: usize = 128;

/// Orchestrates retrieval, reranking and generation for chat requests.
pub struct ChatPipeline {
    corpus: Arc<CorpusHandle>,
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    extractor: MetadataExtractor,
    retriever: HybridRetriever,
    reranker: Reranker,
    history: Arc<dyn HistoryStore>,
    config: PipelineConfig,
}

impl ChatPipeline {
    pub fn new(
        corpus: Arc<CorpusHandle>,
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        reranker: Reranker,
        history: Arc<dyn HistoryStore>,
        config: PipelineConfig,
    ) -> Self {
        let extractor = MetadataExtractor::new(generator.clone(), Arc::clone(&prompts));
        Self {
            corpus,
            generator,
            prompts,
            extractor,
            retriever: HybridRetriever::new(config.dedup),
            reranker,
            history,
            config,
        }
    }

    /// Handle through which the corpus is loaded and replaced.
    pub fn corpus(&self) -> &Arc<CorpusHandle> {
        &self.corpus
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question.
    ///
    /// Invalid input is rejected before any collaborator is called. Any
    /// retrieval or LLM failure aborts the request with that error.
    pub async fn answer(&self, request: ChatRequest) -> AppResult<ChatAnswer> {
        validate_request(&request, self.config.max_question_chars)?;

        let span = tracing::info_span!(
            "answer",
            user = %request.user_id,
            conversation = %request.conversation_id
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: ChatRequest) -> AppResult<ChatAnswer> {
        let snapshot = self.corpus.current()?;
        let history = self.load_history(&request).await;

        if self.check_history(&request.question, &history).await? == HistoryGate::HistoryAnswerable {
            tracing::info!("Answering from conversation history");
            return self.answer_from_history(&request.question, &history).await;
        }

        let top_k = request.top_k.unwrap_or(self.config.top_k);
        let mut context = QueryContext::new(&request.question, top_k, self.config.top_n);

        self.prepare_query(&mut context, &history, &snapshot).await?;

        let candidates = self
            .retriever
            .retrieve(
                &snapshot,
                &context.final_query,
                context.top_k,
                self.config.sparse_k(context.top_k),
            )
            .await?;

        let ranked = self
            .reranker
            .rerank(&context.final_query, &candidates, context.top_n)
            .await;

        tracing::debug!(candidates = candidates.len(), kept = ranked.len(), "Reranked");

        let answer = self.generate(&context, &ranked).await?;
        self.persist(&request, &answer).await;

        Ok(ChatAnswer {
            answer,
            sources: sources(&ranked),
            rerank_fallback: ranked.first().map(|r| r.score.is_none()).unwrap_or(false),
        })
    }

    /// Recent turns, newest first. A read failure counts as no history.
    async fn load_history(&self, request: &ChatRequest) -> Vec<Turn> {
        match self
            .history
            .recent(&request.user_id, &request.conversation_id, self.config.history_limit)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read chat history; continuing without it");
                Vec::new()
            }
        }
    }

    async fn check_history(&self, question: &str, history: &[Turn]) -> AppResult<HistoryGate> {
        let reply = self
            .complete(
                ids::HISTORY_CHECK,
                &[("query", question), ("history", render_history(history).as_str())],
            )
            .await?;

        let gate = HistoryGate::from_reply(&reply);
        tracing::debug!(?gate, "History check");
        Ok(gate)
    }

    async fn answer_from_history(&self, question: &str, history: &[Turn]) -> AppResult<ChatAnswer> {
        let answer = self
            .complete(
                ids::HISTORY_ANSWER,
                &[("history", render_history(history).as_str()), ("question", question)],
            )
            .await?;

        Ok(ChatAnswer {
            answer,
            sources: vec![CHAT_HISTORY_SOURCE.to_string()],
            rerank_fallback: false,
        })
    }

    /// Enhance, fuse metadata and rewrite, filling in `context`.
    async fn prepare_query(
        &self,
        context: &mut QueryContext,
        history: &[Turn],
        snapshot: &CorpusSnapshot,
    ) -> AppResult<()> {
        let reply = self
            .complete(
                ids::QUERY_ENHANCE,
                &[
                    ("query", context.raw_question.as_str()),
                    ("history", render_history(history).as_str()),
                ],
            )
            .await?;
        context.enhanced_query = or_previous(reply, &context.raw_question, "enhancement");
        tracing::debug!(query = %context.enhanced_query, "Enhanced query");

        let query_metadata = self.extractor.extract_from_query(&context.enhanced_query).await?;
        context.metadata = metadata::combine(&query_metadata, &snapshot.corpus_metadata);
        let rendered_metadata = metadata::render(&context.metadata);
        tracing::debug!(metadata = %rendered_metadata, "Combined metadata");

        let reply = self
            .complete(ids::QUERY_REWRITE, &[("query", context.enhanced_query.as_str())])
            .await?;
        context.rewritten_query = or_previous(reply, &context.enhanced_query, "rewrite");
        tracing::debug!(query = %context.rewritten_query, "Rewritten query");

        let reply = self
            .complete(
                ids::QUERY_METADATA,
                &[
                    ("query", context.rewritten_query.as_str()),
                    ("metadata", rendered_metadata.as_str()),
                ],
            )
            .await?;
        context.final_query = or_previous(reply, &context.rewritten_query, "metadata rewrite");
        tracing::debug!(query = %context.final_query, "Final query");

        Ok(())
    }

    async fn generate(&self, context: &QueryContext, ranked: &[RankedResult]) -> AppResult<String> {
        let joined = ranked
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        self.complete(
            ids::ANSWER_GENERATE,
            &[("context", joined.as_str()), ("question", context.raw_question.as_str())],
        )
        .await
    }

    /// Record the exchange. Failures are logged, never returned.
    async fn persist(&self, request: &ChatRequest, answer: &str) {
        let turns = [(Role::User, request.question.as_str()), (Role::Assistant, answer)];
        for (role, content) in turns {
            if let Err(e) = self
                .history
                .append(&request.user_id, &request.conversation_id, role, content)
                .await
            {
                tracing::error!(error = %e, role = role.as_str(), "Failed to save chat history");
            }
        }
    }

    async fn complete(&self, prompt_id: &str, variables: &[(&str, &str)]) -> AppResult<String> {
        let variables: HashMap<String, String> = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let prompt = self.prompts.render(prompt_id, variables)?;
        self.generator.complete(prompt).await
    }
}

/// Reject malformed requests.
pub fn validate_request(request: &ChatRequest, max_question_chars: usize) -> AppResult<()> {
    validate_id("user_id", &request.user_id)?;
    validate_id("conversation_id", &request.conversation_id)?;

    if request.question.trim().is_empty() {
        return Err(AppError::Validation("question must not be empty".to_string()));
    }
    let length = request.question.chars().count();
    if length > max_question_chars {
        return Err(AppError::Validation(format!(
            "question is {} characters; the limit is {}",
            length, max_question_chars
        )));
    }

    if request.top_k == Some(0) {
        return Err(AppError::Validation("top_k must be at least 1".to_string()));
    }

    Ok(())
}

fn validate_id(name: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", name)));
    }
    if value.chars().count() > MAX_ID_CHARS {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            name, MAX_ID_CHARS
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(AppError::Validation(format!(
            "{} must not contain control characters",
            name
        )));
    }
    Ok(())
}

/// Render turns oldest first, one `role: content` line each.
fn render_history(newest_first: &[Turn]) -> String {
    newest_first
        .iter()
        .rev()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_previous(reply: String, previous: &str, stage: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        tracing::warn!(stage, "Empty LLM reply; keeping the previous query");
        previous.to_string()
    } else {
        trimmed.to_string()
    }
}

fn sources(ranked: &[RankedResult]) -> Vec<String> {
    ranked
        .iter()
        .map(|r| r.chunk.source().unwrap_or_else(|| UNKNOWN_SOURCE.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(question: &str) -> ChatRequest {
        ChatRequest::new("user-1", "conv-1", question)
    }

    #[test]
    fn test_validate_accepts_normal_request() {
        assert!(validate_request(&request("What changed in 2023?"), 4000).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_question() {
        let err = validate_request(&request("   "), 4000).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_validate_rejects_long_question() {
        let question = "é".repeat(11);
        assert!(validate_request(&request(&question), 11).is_ok());
        assert!(validate_request(&request(&question), 10).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ids() {
        let blank_user = ChatRequest::new(" ", "c", "q");
        assert!(validate_request(&blank_user, 100).is_err());

        let control = ChatRequest::new("u", "c\n1", "q");
        assert!(validate_request(&control, 100).is_err());

        let long = ChatRequest::new("u".repeat(129), "c", "q");
        assert!(validate_request(&long, 100).is_err());

        let at_limit = ChatRequest::new("u".repeat(128), "c", "q");
        assert!(validate_request(&at_limit, 100).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let err = validate_request(&request("q").with_top_k(0), 100).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(validate_request(&request("q").with_top_k(1), 100).is_ok());
    }

    #[test]
    fn test_render_history_is_oldest_first() {
        let turn = |role, content: &str| Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        let newest_first = vec![
            turn(Role::Assistant, "It rose 10%."),
            turn(Role::User, "How did revenue change?"),
        ];
        assert_eq!(
            render_history(&newest_first),
            "user: How did revenue change?\nassistant: It rose 10%."
        );
    }

    #[test]
    fn test_or_previous() {
        assert_eq!(or_previous("  new query \n".to_string(), "old", "rewrite"), "new query");
        assert_eq!(or_previous("   ".to_string(), "old", "rewrite"), "old");
    }
}
