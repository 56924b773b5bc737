//! Cross-encoder reranking.
//!
//! Candidates are scored against the query in one batched call and sorted by
//! score. When scoring is unavailable the reranker passes the first `top_n`
//! candidates through unscored instead of failing the request.

use crate::config::RerankerConfig;
use crate::types::{Candidate, RankedResult};
use async_trait::async_trait;
use docchat_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

/// Relevance of texts to a query.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per text, in input order. Higher is more relevant.
    async fn score(&self, query: &str, texts: &[String]) -> AppResult<Vec<f32>>;
}

/// Client for a text-embeddings-inference style `/rerank` endpoint.
#[derive(Debug, Clone)]
pub struct CrossEncoderClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

impl CrossEncoderClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Rerank(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderClient {
    async fn score(&self, query: &str, texts: &[String]) -> AppResult<Vec<f32>> {
        let url = format!("{}/rerank", self.base_url);
        let body = RerankRequest {
            query,
            texts,
            raw_scores: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Rerank request timed out: {}", e))
                } else {
                    AppError::Rerank(format!("Failed to reach reranker at {}: {}", url, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Rerank(format!("Reranker returned {}: {}", status, text)));
        }

        let hits: Vec<RerankHit> = response
            .json()
            .await
            .map_err(|e| AppError::Rerank(format!("Invalid reranker response: {}", e)))?;

        scores_by_index(hits, texts.len())
    }
}

/// Reorder `[{index, score}]` hits into input order.
fn scores_by_index(hits: Vec<RerankHit>, expected: usize) -> AppResult<Vec<f32>> {
    if hits.len() != expected {
        return Err(AppError::Rerank(format!(
            "Reranker scored {} of {} texts",
            hits.len(),
            expected
        )));
    }

    let mut scores: Vec<Option<f32>> = vec![None; expected];
    for hit in hits {
        let slot = scores
            .get_mut(hit.index)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| {
                AppError::Rerank(format!("Reranker returned invalid index {}", hit.index))
            })?;
        *slot = Some(hit.score);
    }

    Ok(scores.into_iter().flatten().collect())
}

/// Orders candidates by relevance, falling back to pass-through.
pub struct Reranker {
    scorer: Option<Arc<dyn RelevanceScorer>>,
    timeout: Duration,
    fallbacks: AtomicU64,
}

impl Reranker {
    pub fn new(scorer: Option<Arc<dyn RelevanceScorer>>, timeout: Duration) -> Self {
        Self {
            scorer,
            timeout,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Reranker backed by the configured cross-encoder, or a pass-through
    /// when no endpoint is set.
    pub fn from_config(config: &RerankerConfig, timeout: Duration) -> AppResult<Self> {
        let scorer: Option<Arc<dyn RelevanceScorer>> = match &config.endpoint {
            Some(endpoint) => Some(Arc::new(CrossEncoderClient::new(
                endpoint.as_str(),
                config.model.as_str(),
                timeout,
            )?)),
            None => None,
        };
        Ok(Self::new(scorer, timeout))
    }

    /// Times scoring fell back to pass-through.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(AtomicOrdering::Relaxed)
    }

    /// Top `top_n` candidates by score, ties kept in candidate order.
    ///
    /// Never fails: without usable scores the first `top_n` candidates come
    /// back in input order with no score.
    pub async fn rerank(&self, query: &str, candidates: &[Candidate], top_n: usize) -> Vec<RankedResult> {
        if candidates.is_empty() {
            return Vec::new();
        }

        match self.try_score(query, candidates).await {
            Ok(scores) => {
                let mut ranked: Vec<RankedResult> = candidates
                    .iter()
                    .zip(scores)
                    .map(|(candidate, score)| RankedResult {
                        chunk: Arc::clone(&candidate.chunk),
                        score: Some(score),
                    })
                    .collect();

                ranked.sort_by(|a, b| descending_nan_last(a.score, b.score));
                ranked.truncate(top_n);
                ranked
            }
            Err(e) => {
                self.fallbacks.fetch_add(1, AtomicOrdering::Relaxed);
                tracing::warn!(error = %e, "Reranking unavailable; keeping retrieval order");
                passthrough(candidates, top_n)
            }
        }
    }

    async fn try_score(&self, query: &str, candidates: &[Candidate]) -> AppResult<Vec<f32>> {
        let scorer = self
            .scorer
            .as_ref()
            .ok_or_else(|| AppError::Rerank("no scorer configured".to_string()))?;

        let texts: Vec<String> = candidates.iter().map(|c| c.chunk.text.clone()).collect();

        let scores = tokio::time::timeout(self.timeout, scorer.score(query, &texts))
            .await
            .map_err(|_| {
                AppError::Timeout(format!("Scoring exceeded {}s", self.timeout.as_secs()))
            })??;

        if scores.len() != candidates.len() {
            return Err(AppError::Rerank(format!(
                "Expected {} scores, got {}",
                candidates.len(),
                scores.len()
            )));
        }

        Ok(scores)
    }
}

fn passthrough(candidates: &[Candidate], top_n: usize) -> Vec<RankedResult> {
    candidates
        .iter()
        .take(top_n)
        .map(|candidate| RankedResult {
            chunk: Arc::clone(&candidate.chunk),
            score: None,
        })
        .collect()
}

fn descending_nan_last(a: Option<f32>, b: Option<f32>) -> Ordering {
    let a = a.filter(|s| !s.is_nan());
    let b = b.filter(|s| !s.is_nan());
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
