//! Chat command handler.
//!
//! Interactive question loop over a document folder, one conversation per run.

use crate::commands::print_answer;
use crate::commands::session::Session;
use clap::Args;
use docchat_core::{config::AppConfig, AppResult};
use docchat_knowledge::ChatRequest;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Chat with a document folder
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Folder of documents to answer from
    #[arg(short, long)]
    pub docs: PathBuf,

    /// User id the conversation is recorded under
    #[arg(short, long, default_value = "local")]
    pub user: String,

    /// Conversation id to continue (default: a fresh one)
    #[arg(long)]
    pub conversation: Option<String>,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let session = Session::open(config, &self.docs).await?;
        let conversation = self
            .conversation
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        eprintln!("Conversation {}. Type :reload to re-read the documents, :quit to exit.", conversation);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("> ");
            std::io::stderr().flush().ok();

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let line = line.trim();

            match line {
                "" => continue,
                ":quit" | ":q" => break,
                ":reload" => {
                    match session.reload().await {
                        Ok(chunks) => eprintln!("Reloaded {} chunks.", chunks),
                        Err(e) => eprintln!("Reload failed, keeping the current documents: {}", e),
                    }
                    continue;
                }
                _ => {}
            }

            let request = ChatRequest::new(&self.user, &conversation, line);
            match session.pipeline.answer(request).await {
                Ok(answer) => print_answer(&answer, false)?,
                // One failed question does not end the session
                Err(e) => eprintln!("Error ({}): {}", e.kind(), e),
            }
        }

        Ok(())
    }
}
