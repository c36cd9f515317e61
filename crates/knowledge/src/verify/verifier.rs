//! Faithfulness verification of an answer against its source passages.

use super::extractor::{
    extract_with_chain, ClaimExtractor, HeuristicClaimExtractor, LlmClaimExtractor,
};
use crate::types::{
    Claim, FaithfulnessConfidence, FaithfulnessResult, SourcePassage, VerifiedClaim,
};
use askbase_core::{AppError, AppResult};
use askbase_llm::{LlmClient, LlmRequest};
use askbase_prompt::{PromptId, PromptLibrary};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Only this many leading sources are shown to the model per claim.
pub const MAX_SOURCES_PER_CHECK: usize = 5;

/// Claims below this confidence are reported by `detect_hallucinations`
/// even when supported.
pub const LOW_CONFIDENCE: f32 = 0.5;

/// Confidence given to raw claim strings checked in a batch.
const BATCH_CLAIM_CONFIDENCE: f32 = 1.0;

/// Checks answers claim by claim against source passages.
#[derive(Clone)]
pub struct FaithfulnessVerifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
    extractors: Vec<Arc<dyn ClaimExtractor>>,
}

impl FaithfulnessVerifier {
    /// Verifier extracting claims with the model first and sentence
    /// splitting as the fallback.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let extractors: Vec<Arc<dyn ClaimExtractor>> = vec![
            Arc::new(LlmClaimExtractor::new(
                llm.clone(),
                prompts.clone(),
                model.clone(),
            )),
            Arc::new(HeuristicClaimExtractor),
        ];
        Self {
            llm,
            prompts,
            model,
            extractors,
        }
    }

    /// Replace the extraction chain.
    pub fn with_extractors(mut self, extractors: Vec<Arc<dyn ClaimExtractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Verify `answer` against `sources`.
    ///
    /// An empty answer is a validation error. Without sources nothing can be
    /// supported, so the whole answer is reported unsupported. An answer
    /// without checkable claims is trivially faithful.
    pub async fn verify(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<FaithfulnessResult> {
        let answer = require_answer(answer)?;

        if sources.is_empty() {
            info!("No sources to verify against, marking answer as hallucination");
            return Ok(FaithfulnessResult {
                score: 0.0,
                claims: Vec::new(),
                unsupported_claims: vec![answer.to_string()],
                confidence: FaithfulnessConfidence::Hallucination,
                reasoning: "No source passages were provided, so no claim can be supported"
                    .to_string(),
            });
        }

        let claims = extract_with_chain(&self.extractors, answer).await;
        if claims.is_empty() {
            info!("No checkable claims in answer");
            return Ok(FaithfulnessResult {
                score: 1.0,
                claims: Vec::new(),
                unsupported_claims: Vec::new(),
                confidence: FaithfulnessConfidence::High,
                reasoning: "The answer contains no checkable factual claims".to_string(),
            });
        }

        let mut verified = Vec::with_capacity(claims.len());
        for claim in claims {
            verified.push(self.verify_claim(claim, sources).await);
        }

        let result = aggregate(verified);
        info!(
            "Faithfulness {:.2} ({}), {} unsupported claims",
            result.score,
            result.confidence.as_str(),
            result.unsupported_claims.len()
        );
        Ok(result)
    }

    /// Extract claims from `answer` without checking them.
    pub async fn extract_claims(&self, answer: &str) -> AppResult<Vec<Claim>> {
        let answer = require_answer(answer)?;
        Ok(extract_with_chain(&self.extractors, answer).await)
    }

    /// Check one claim against the first sources.
    ///
    /// Only a `TRUE` verdict counts as supported. An empty claim, no
    /// sources, any other verdict and a failed model call all leave the
    /// claim unsupported.
    pub async fn verify_claim(&self, claim: Claim, sources: &[SourcePassage]) -> VerifiedClaim {
        if claim.statement.trim().is_empty() || sources.is_empty() {
            return unsupported(claim);
        }

        let shown = &sources[..sources.len().min(MAX_SOURCES_PER_CHECK)];
        let block = shown
            .iter()
            .enumerate()
            .map(|(i, s)| format!("[{}] {}", i + 1, s.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = match self.prompts.render(
            PromptId::VerifyCheckClaim,
            &[("sources", block.as_str()), ("claim", claim.statement.as_str())],
        ) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Claim check prompt failed to render: {}", e);
                return unsupported(claim);
            }
        };

        let mut request =
            LlmRequest::new(prompt.user, self.model.as_str()).with_temperature(0.0);
        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }

        match self.llm.complete(&request).await {
            Ok(response) => {
                let (supported, source_ref) = parse_verdict(&response.content, shown);
                debug!("Claim '{}' supported: {}", claim.statement, supported);
                VerifiedClaim {
                    claim,
                    supported,
                    source_ref,
                }
            }
            Err(e) => {
                warn!("Claim check failed, treating as unsupported: {}", e);
                unsupported(claim)
            }
        }
    }

    /// Check raw claim strings one after another.
    pub async fn verify_claims_batch(
        &self,
        claims: &[String],
        sources: &[SourcePassage],
    ) -> Vec<VerifiedClaim> {
        let mut verified = Vec::with_capacity(claims.len());
        for statement in claims {
            let claim = Claim::new(statement.trim(), BATCH_CLAIM_CONFIDENCE);
            verified.push(self.verify_claim(claim, sources).await);
        }
        verified
    }

    pub async fn faithfulness_score(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<f32> {
        Ok(self.verify(answer, sources).await?.score)
    }

    /// Statements that are unsupported or extracted with low confidence.
    pub async fn detect_hallucinations(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<Vec<String>> {
        let result = self.verify(answer, sources).await?;
        if result.claims.is_empty() {
            return Ok(result.unsupported_claims);
        }

        Ok(result
            .claims
            .into_iter()
            .filter(|c| !c.supported || c.claim.confidence < LOW_CONFIDENCE)
            .map(|c| c.claim.statement)
            .collect())
    }
}

fn require_answer(answer: &str) -> AppResult<&str> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "Answer text must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn unsupported(claim: Claim) -> VerifiedClaim {
    VerifiedClaim {
        claim,
        supported: false,
        source_ref: None,
    }
}

fn source_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("source marker pattern is valid"))
}

/// Read a `TRUE` / `FALSE` / `UNKNOWN` verdict.
///
/// A supported verdict may name its passage as `TRUE [n]`; the reference is
/// the passage id when it has one, `[n]` otherwise.
pub fn parse_verdict(response: &str, shown: &[SourcePassage]) -> (bool, Option<String>) {
    let verdict = response.trim().to_uppercase();
    if !verdict.starts_with("TRUE") {
        return (false, None);
    }

    let source_ref = source_marker_regex()
        .captures(&verdict)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| (1..=shown.len()).contains(n))
        .map(|n| {
            shown[n - 1]
                .id
                .clone()
                .unwrap_or_else(|| format!("[{}]", n))
        });

    (true, source_ref)
}

/// Score, bucket and explain a set of checked claims.
pub fn aggregate(claims: Vec<VerifiedClaim>) -> FaithfulnessResult {
    let total = claims.len();
    let supported = claims.iter().filter(|c| c.supported).count();
    let score = if total == 0 {
        1.0
    } else {
        round2(supported as f32 / total as f32)
    };

    let unsupported_claims = claims
        .iter()
        .filter(|c| !c.supported)
        .map(|c| c.claim.statement.clone())
        .collect();

    FaithfulnessResult {
        score,
        claims,
        unsupported_claims,
        confidence: FaithfulnessConfidence::from_score(score),
        reasoning: format!(
            "{} of {} claims ({:.0}%) are supported by the sources",
            supported,
            total,
            score * 100.0
        ),
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
