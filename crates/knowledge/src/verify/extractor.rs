//! Claim extraction strategies.
//!
//! Extractors are tried in order and the first one that succeeds wins; see
//! [`extract_with_chain`].

use crate::llm_output::parse_json_array;
use crate::types::Claim;
use askbase_core::{AppError, AppResult};
use askbase_llm::{LlmClient, LlmRequest};
use askbase_prompt::{PromptId, PromptLibrary};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sentences at or below this many characters are not treated as claims.
const MIN_SENTENCE_CHARS: usize = 20;

const MAX_HEURISTIC_CLAIMS: usize = 5;

const HEURISTIC_CONFIDENCE: f32 = 0.6;

/// Used when the model omits a claim's confidence.
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.8;

/// Splits an answer into atomic claims.
#[async_trait::async_trait]
pub trait ClaimExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, answer: &str) -> AppResult<Vec<Claim>>;
}

/// Run `extractors` in order and return the first successful extraction.
///
/// Returns an empty list if every strategy fails.
pub async fn extract_with_chain(
    extractors: &[Arc<dyn ClaimExtractor>],
    answer: &str,
) -> Vec<Claim> {
    for extractor in extractors {
        match extractor.extract(answer).await {
            Ok(claims) => {
                debug!("{} extractor found {} claims", extractor.name(), claims.len());
                return claims;
            }
            Err(e) => warn!("{} claim extraction failed: {}", extractor.name(), e),
        }
    }
    Vec::new()
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    statement: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Asks the language model for a JSON array of `{statement, confidence}`.
pub struct LlmClaimExtractor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
}

impl LlmClaimExtractor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            prompts,
            model: model.into(),
        }
    }
}

#[async_trait::async_trait]
impl ClaimExtractor for LlmClaimExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(&self, answer: &str) -> AppResult<Vec<Claim>> {
        let prompt = self
            .prompts
            .render(PromptId::VerifyExtractClaims, &[("answer", answer)])?;
        let mut request = LlmRequest::new(prompt.user, self.model.as_str()).with_temperature(0.0);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        let response = self.llm.complete(&request).await?;
        let raw: Vec<RawClaim> = parse_json_array(&response.content).ok_or_else(|| {
            AppError::Llm("Claim extraction response is not a JSON array of claims".to_string())
        })?;

        Ok(raw
            .into_iter()
            .filter(|c| !c.statement.trim().is_empty())
            .map(|c| {
                Claim::new(
                    c.statement.trim(),
                    c.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE),
                )
            })
            .collect())
    }
}

/// Sentence splitting; never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClaimExtractor;

impl HeuristicClaimExtractor {
    pub fn split(answer: &str) -> Vec<Claim> {
        answer
            .split(['.', '!', '?'])
            .map(str::trim)
            .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
            .filter(|s| {
                let lower = s.to_lowercase();
                !lower.starts_with("http://") && !lower.starts_with("https://")
            })
            .take(MAX_HEURISTIC_CLAIMS)
            .map(|s| Claim::new(s, HEURISTIC_CONFIDENCE))
            .collect()
    }
}

#[async_trait::async_trait]
impl ClaimExtractor for HeuristicClaimExtractor {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn extract(&self, answer: &str) -> AppResult<Vec<Claim>> {
        Ok(Self::split(answer))
    }
}
