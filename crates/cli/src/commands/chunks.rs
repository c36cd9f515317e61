//! Chunks command handler.
//!
//! Inspects and removes the stored chunks of a document.

use super::print_json;
use askbase_core::{config::AppConfig, AppResult};
use askbase_knowledge::KnowledgeService;
use clap::{Args, Subcommand};

/// Inspect or delete stored chunks
#[derive(Args, Debug)]
pub struct ChunksCommand {
    #[command(subcommand)]
    pub action: ChunksAction,
}

#[derive(Subcommand, Debug)]
pub enum ChunksAction {
    /// List the chunks of a document
    List {
        /// Document id
        document: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all chunks of a document
    Delete {
        /// Document id
        document: String,
    },
}

impl ChunksCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = KnowledgeService::open(config)?;

        match &self.action {
            ChunksAction::List { document, json } => {
                tracing::info!("Executing chunks list command for '{}'", document);
                let chunks = service.get_chunks_for_resource(document).await?;

                if *json {
                    print_json(&chunks)?;
                    return Ok(());
                }

                if chunks.is_empty() {
                    println!("No chunks stored for '{}'", document);
                }
                for chunk in &chunks {
                    println!(
                        "#{} {} [{}..{}] {} chars{}",
                        chunk.position,
                        chunk.source_section,
                        chunk.char_start,
                        chunk.char_end,
                        chunk.content.chars().count(),
                        if chunk.embedding.is_some() {
                            ""
                        } else {
                            " (no embedding)"
                        }
                    );
                }
            }
            ChunksAction::Delete { document } => {
                tracing::info!("Executing chunks delete command for '{}'", document);
                let removed = service.delete_chunks_for_resource(document).await?;
                println!("Deleted {} chunks from '{}'", removed, document);
            }
        }

        Ok(())
    }
}
