//! Bounded LLM calls for rendered prompts.

use docchat_core::{AppError, AppResult};
use docchat_llm::{LlmClient, LlmRequest};
use docchat_prompt::BuiltPrompt;
use std::sync::Arc;
use std::time::Duration;

/// An LLM client bound to a model and a per-call time budget.
#[derive(Clone)]
pub struct Generator {
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            llm,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a rendered prompt and return the raw reply text.
    ///
    /// Expiry of the budget is an `AppError::Timeout`; provider errors pass through.
    pub async fn complete(&self, prompt: BuiltPrompt) -> AppResult<String> {
        let prompt_id = prompt.metadata.source_prompt_id.clone();
        let mut request = LlmRequest::new(prompt.user, self.model.clone());
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        tracing::debug!(prompt = %prompt_id, provider = self.llm.provider_name(), "LLM call");

        let response = tokio::time::timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "LLM call for '{}' exceeded {}s",
                    prompt_id,
                    self.timeout.as_secs()
                ))
            })??;

        Ok(response.content)
    }
}
