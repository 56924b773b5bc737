//! History command handler.

use clap::Args;
use docchat_core::{config::AppConfig, AppResult};
use docchat_knowledge::history::DEFAULT_HISTORY_LIMIT;
use docchat_knowledge::{load_config, HistoryStore, SqliteHistoryStore};

/// Show the latest turns of a conversation
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// User id
    #[arg(short, long)]
    pub user: String,

    /// Conversation id
    #[arg(long)]
    pub conversation: String,

    /// Number of turns to show
    #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let pipeline_config = load_config(&config.workspace)?;
        let store = SqliteHistoryStore::open(&pipeline_config.history_path(&config.workspace))?;

        let mut turns = store.recent(&self.user, &self.conversation, self.limit).await?;
        // Print in reading order
        turns.reverse();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&turns)?);
        } else if turns.is_empty() {
            println!("No history for this conversation.");
        } else {
            for turn in &turns {
                println!(
                    "[{}] {}: {}",
                    turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    turn.role.as_str(),
                    turn.content
                );
            }
        }

        Ok(())
    }
}
