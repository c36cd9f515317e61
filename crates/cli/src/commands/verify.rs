//! Verify and claims command handlers.

use super::print_json;
use askbase_core::{config::AppConfig, AppError, AppResult};
use askbase_knowledge::{FaithfulnessResult, KnowledgeService, SearchFilters, SourcePassage};
use clap::Args;

/// Check an answer's claims against source passages
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// The answer text to verify
    pub answer: String,

    /// Use the chunks retrieved for this query as sources
    #[arg(short, long)]
    pub query: Option<String>,

    /// Use the stored chunks of this document as sources
    #[arg(short, long)]
    pub document: Option<String>,

    /// Literal source passage (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Only list unsupported claims
    #[arg(long, conflicts_with = "score_only")]
    pub hallucinations: bool,

    /// Only print the faithfulness score
    #[arg(long)]
    pub score_only: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing verify command");

        let service = KnowledgeService::open(config)?;
        let sources = self.collect_sources(&service).await?;
        tracing::debug!("Verifying against {} source passages", sources.len());

        if self.score_only {
            let score = service.get_faithfulness_score(&self.answer, &sources).await?;
            if self.json {
                print_json(&serde_json::json!({ "score": score }))?;
            } else {
                println!("{:.2}", score);
            }
            return Ok(());
        }

        if self.hallucinations {
            let unsupported = service.detect_hallucinations(&self.answer, &sources).await?;
            if self.json {
                print_json(&unsupported)?;
            } else if unsupported.is_empty() {
                println!("No unsupported claims");
            } else {
                for claim in &unsupported {
                    println!("- {}", claim);
                }
            }
            return Ok(());
        }

        let result = service.verify_faithfulness(&self.answer, &sources).await?;
        if self.json {
            print_json(&result)?;
        } else {
            print_result(&result);
        }
        Ok(())
    }

    async fn collect_sources(&self, service: &KnowledgeService) -> AppResult<Vec<SourcePassage>> {
        let mut sources: Vec<SourcePassage> =
            self.sources.iter().map(SourcePassage::new).collect();

        if let Some(document) = &self.document {
            let passages = service.sources_for_resource(document).await?;
            if passages.is_empty() {
                return Err(AppError::Validation(format!(
                    "Document '{}' has no stored chunks",
                    document
                )));
            }
            sources.extend(passages);
        }

        if let Some(query) = &self.query {
            let context = service
                .retrieve_context(query, None, &SearchFilters::new())
                .await;
            sources.extend(context.iter().map(SourcePassage::from));
        }

        Ok(sources)
    }
}

fn print_result(result: &FaithfulnessResult) {
    println!(
        "Faithfulness: {:.2} ({})",
        result.score,
        result.confidence.as_str()
    );
    println!("{}", result.reasoning);

    if !result.claims.is_empty() {
        println!();
        for verified in &result.claims {
            let mark = if verified.supported { "+" } else { "-" };
            let source = verified
                .source_ref
                .as_deref()
                .map(|s| format!(" [{}]", s))
                .unwrap_or_default();
            println!("  {} {}{}", mark, verified.claim.statement, source);
        }
    }
}

/// List the atomic claims in an answer
#[derive(Args, Debug)]
pub struct ClaimsCommand {
    /// The answer text
    pub answer: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClaimsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing claims command");

        let service = KnowledgeService::open(config)?;
        let claims = service.extract_claims(&self.answer).await?;

        if self.json {
            print_json(&claims)?;
        } else if claims.is_empty() {
            println!("No claims found");
        } else {
            for claim in &claims {
                println!("({:.2}) {}", claim.confidence, claim.statement);
            }
        }
        Ok(())
    }
}
