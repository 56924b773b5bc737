//! Command handlers for the docchat CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod chat;
pub mod corpus;
pub mod history;
mod session;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use corpus::CorpusCommand;
pub use history::HistoryCommand;

use docchat_knowledge::ChatAnswer;

/// Print an answer to stdout, as text or JSON.
pub(crate) fn print_answer(answer: &ChatAnswer, json: bool) -> docchat_core::AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
    } else {
        println!("{}", answer.answer);
        if !answer.sources.is_empty() {
            println!();
            println!("Sources:");
            for source in &answer.sources {
                println!("  - {}", source);
            }
        }
    }
    Ok(())
}
