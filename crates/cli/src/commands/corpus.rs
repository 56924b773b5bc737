//! Corpus command handler.
//!
//! Reports what a document folder yields without calling any model.

use clap::Args;
use docchat_core::{config::AppConfig, AppResult};
use docchat_knowledge::metadata::{infer_from_corpus, render};
use docchat_knowledge::{ingest_folder, load_config, IngestOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Inspect a document folder
#[derive(Args, Debug)]
pub struct CorpusCommand {
    /// Folder of documents to ingest
    #[arg(short, long)]
    pub docs: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CorpusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing corpus command");

        let pipeline_config = load_config(&config.workspace)?;
        let report = ingest_folder(&self.docs, &IngestOptions::from(&pipeline_config)).await?;

        let chunks: Vec<_> = report.chunks.iter().cloned().map(Arc::new).collect();
        let inferred = infer_from_corpus(&chunks, &pipeline_config.metadata);

        if self.json {
            let output = serde_json::json!({
                "chunks": report.chunks.len(),
                "files": report.files_loaded,
                "skipped": report
                    .files_skipped
                    .iter()
                    .map(|(path, reason)| serde_json::json!({ "path": path, "reason": reason }))
                    .collect::<Vec<_>>(),
                "metadata": inferred,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Chunks: {}", report.chunks.len());
            println!("Files: {}", report.files_loaded.len());
            for path in &report.files_loaded {
                println!("  - {}", path.display());
            }
            if !report.files_skipped.is_empty() {
                println!("Skipped: {}", report.files_skipped.len());
                for (path, reason) in &report.files_skipped {
                    println!("  - {} ({})", path.display(), reason);
                }
            }
            println!("Corpus metadata: {}", render(&inferred));
        }

        Ok(())
    }
}
