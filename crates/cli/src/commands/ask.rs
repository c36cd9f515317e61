//! Ask command handler.
//!
//! Answers a question from the knowledge base with citations.

use super::{build_filters, print_json};
use askbase_core::{config::AppConfig, AppResult};
use askbase_knowledge::{ChatResponse, KnowledgeService};
use clap::Args;

/// Ask a question against the knowledge base
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// Continue an existing chat session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Only use chunks tagged with one of these topics (repeatable)
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Only use chunks of these document types (repeatable)
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,

    /// Only use chunks in this language
    #[arg(long)]
    pub language: Option<String>,

    /// Check the answer against its sources
    #[arg(long)]
    pub verify: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let filters = build_filters(&self.topics, &self.types, self.language.as_deref())?;
        let mut service = KnowledgeService::open(config)?;
        if self.verify {
            service = service.with_verify_answers(true);
        }

        let response = service
            .chat(&self.query, self.session.as_deref(), &filters)
            .await?;

        if self.json {
            print_json(&response)?;
        } else {
            print_response(&response);
        }

        Ok(())
    }
}

fn print_response(response: &ChatResponse) {
    let answer = &response.answer;
    println!("{}", answer.answer);

    if !answer.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in answer.citations.iter().enumerate() {
            let section = citation
                .section
                .as_deref()
                .map(|s| format!(" - {}", s))
                .unwrap_or_default();
            println!("  [{}] {}{}", i + 1, citation.resource_title, section);
            if let Some(url) = &citation.url {
                println!("      {}", url);
            }
        }
    }

    println!();
    println!("Confidence: {}", answer.confidence.as_str());

    if let Some(faithfulness) = &response.faithfulness {
        println!(
            "Faithfulness: {:.2} ({})",
            faithfulness.score,
            faithfulness.confidence.as_str()
        );
        for claim in &faithfulness.unsupported_claims {
            println!("  unsupported: {}", claim);
        }
    }

    if !answer.follow_up_questions.is_empty() {
        println!();
        println!("You could also ask:");
        for question in &answer.follow_up_questions {
            println!("  - {}", question);
        }
    }

    println!();
    println!("Session: {}", response.session_id);
}
