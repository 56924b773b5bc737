//! Ask command handler.
//!
//! Loads a document folder and answers a single question over it.

use crate::commands::print_answer;
use crate::commands::session::Session;
use clap::Args;
use docchat_core::{config::AppConfig, AppResult};
use docchat_knowledge::ChatRequest;
use std::path::PathBuf;

/// Answer one question over a document folder
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Folder of documents to answer from
    #[arg(short, long)]
    pub docs: PathBuf,

    /// User id the exchange is recorded under
    #[arg(short, long, default_value = "local")]
    pub user: String,

    /// Conversation id (default: a fresh one)
    #[arg(long)]
    pub conversation: Option<String>,

    /// Number of dense candidates to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let session = Session::open(config, &self.docs).await?;

        let conversation = self
            .conversation
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut request = ChatRequest::new(&self.user, conversation, &self.question);
        if let Some(top_k) = self.top_k {
            request = request.with_top_k(top_k);
        }

        let answer = session.pipeline.answer(request).await?;
        print_answer(&answer, self.json)
    }
}
