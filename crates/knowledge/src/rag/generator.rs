//! Grounded answer generation over retrieved passages.

use crate::llm_output::parse_json_array;
use crate::types::{AnswerConfidence, Citation, GeneratedAnswer, RetrievedChunk};
use askbase_core::AppResult;
use askbase_llm::{ChatMessage, LlmClient, LlmRequest, ModelTier};
use askbase_prompt::{BuiltPrompt, PromptId, PromptLibrary};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum characters in a citation excerpt, ellipsis included.
pub const MAX_EXCERPT_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

/// More retrieved chunks than this switches to the heavy model.
const HEAVY_CHUNK_THRESHOLD: usize = 3;

/// Queries longer than this (in chars) switch to the heavy model.
const HEAVY_QUERY_CHARS: usize = 200;

const MAX_FOLLOW_UPS: usize = 3;

/// Model and behaviour settings for [`AnswerGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub fast_model: String,
    pub heavy_model: String,
    pub history_turns: usize,
    pub follow_up_questions: bool,
}

impl GeneratorSettings {
    /// Both tiers on the same model, with default history and follow-ups on.
    pub fn single_model(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            fast_model: model.clone(),
            heavy_model: model,
            history_turns: 6,
            follow_up_questions: true,
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Heavy => &self.heavy_model,
        }
    }
}

/// Turns retrieved chunks into a cited answer.
#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    settings: GeneratorSettings,
}

impl AnswerGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            llm,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Generate an answer for `query` from `retrieved`, most relevant first.
    ///
    /// With no retrieved chunks the model is asked to admit it has no
    /// information; confidence is then `uncertain` and there are no
    /// citations. A failed model call for the answer itself is returned as
    /// an error. Follow-up suggestions are best effort.
    pub async fn generate(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk],
        history: &[ChatMessage],
    ) -> AppResult<GeneratedAnswer> {
        let tier = select_tier(query, retrieved.len());
        let model = self.settings.model_for(tier);
        let history = recent_turns(history, self.settings.history_turns);

        if retrieved.is_empty() {
            info!("No context retrieved, answering without sources");
            let prompt = self
                .prompts
                .render(PromptId::AnswerNoContext, &[("query", query)])?;
            let request = build_request(prompt, model).with_history(history);
            let response = self.llm.complete(&request).await?;

            return Ok(GeneratedAnswer {
                answer: response.content.trim().to_string(),
                citations: Vec::new(),
                confidence: AnswerConfidence::Uncertain,
                follow_up_questions: Vec::new(),
                model: response.model,
            });
        }

        let context = build_context(retrieved);
        let prompt = self.prompts.render(
            PromptId::AnswerGrounded,
            &[("context", context.as_str()), ("query", query)],
        )?;
        let request = build_request(prompt, model)
            .with_history(history)
            .with_temperature(0.2);

        debug!(
            "Generating grounded answer with {:?} model '{}' over {} chunks",
            tier,
            model,
            retrieved.len()
        );
        let response = self.llm.complete(&request).await?;
        let answer = response.content.trim().to_string();

        let confidence = AnswerConfidence::from_mean_relevance(mean_relevance(retrieved));
        let citations = build_citations(retrieved, &answer);

        let follow_up_questions = if self.settings.follow_up_questions {
            self.follow_ups(query, &answer).await
        } else {
            Vec::new()
        };

        info!(
            "Answer generated: {} citations ({} referenced), confidence {}",
            citations.len(),
            citations.iter().filter(|c| c.referenced).count(),
            confidence.as_str()
        );

        Ok(GeneratedAnswer {
            answer,
            citations,
            confidence,
            follow_up_questions,
            model: response.model,
        })
    }

    async fn follow_ups(&self, query: &str, answer: &str) -> Vec<String> {
        let prompt = match self.prompts.render(
            PromptId::AnswerFollowUp,
            &[("query", query), ("answer", answer)],
        ) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Follow-up prompt failed to render: {}", e);
                return Vec::new();
            }
        };

        let request = build_request(prompt, self.settings.model_for(ModelTier::Fast));
        match self.llm.complete(&request).await {
            Ok(response) => parse_follow_ups(&response.content).unwrap_or_else(|| {
                warn!("Follow-up response was not a JSON array of strings");
                Vec::new()
            }),
            Err(e) => {
                warn!("Follow-up generation failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Mean rank relevance, rounded to 4 decimals so bucket boundaries are exact.
fn mean_relevance(retrieved: &[RetrievedChunk]) -> f32 {
    let mean = retrieved.iter().map(|r| r.relevance).sum::<f32>() / retrieved.len() as f32;
    (mean * 10_000.0).round() / 10_000.0
}

fn build_request(prompt: BuiltPrompt, model: &str) -> LlmRequest {
    let request = LlmRequest::new(prompt.user, model);
    match prompt.system {
        Some(system) => request.with_system(system),
        None => request,
    }
}

/// Heavy model for many chunks or a long query, fast model otherwise.
pub fn select_tier(query: &str, chunk_count: usize) -> ModelTier {
    if chunk_count > HEAVY_CHUNK_THRESHOLD || query.chars().count() > HEAVY_QUERY_CHARS {
        ModelTier::Heavy
    } else {
        ModelTier::Fast
    }
}

fn recent_turns(history: &[ChatMessage], turns: usize) -> Vec<ChatMessage> {
    let skip = history.len().saturating_sub(turns);
    history[skip..].to_vec()
}

/// Numbered context block: `[n] section - title` followed by the content.
pub fn build_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] {} - {}\n{}",
                i + 1,
                r.chunk.source_section,
                r.document_title,
                r.chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn citation_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation pattern is valid"))
}

/// Bracket numbers cited in `answer`, e.g. `[1]`, `[2][3]` or `[2, 4]`.
pub fn cited_numbers(answer: &str) -> HashSet<usize> {
    citation_marker_regex()
        .captures_iter(answer)
        .flat_map(|caps| {
            caps[1]
                .split(',')
                .filter_map(|n| n.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

fn build_citations(retrieved: &[RetrievedChunk], answer: &str) -> Vec<Citation> {
    let cited = cited_numbers(answer);

    retrieved
        .iter()
        .enumerate()
        .map(|(i, r)| Citation {
            resource_id: r.chunk.document_id.clone(),
            resource_title: r.document_title.clone(),
            chunk_id: r.chunk.id.clone().unwrap_or_default(),
            excerpt: truncate_excerpt(&r.chunk.content, MAX_EXCERPT_CHARS),
            url: r.document_url.clone(),
            page: r.chunk.page_number,
            section: Some(r.chunk.source_section.clone()).filter(|s| !s.is_empty()),
            referenced: cited.contains(&(i + 1)),
        })
        .collect()
}

/// Shorten `text` to at most `max_chars` characters.
///
/// Longer text is cut after the last whole word that fits and marked with
/// `...`; the marker counts toward the limit. A single word longer than the
/// limit is cut mid-word.
pub fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(ELLIPSIS.len());
    let limit = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    let mut cut = 0;
    for (start, word) in text.split_word_bound_indices() {
        let end = start + word.len();
        if end > limit {
            break;
        }
        if !word.trim().is_empty() {
            cut = end;
        }
    }
    if cut == 0 {
        cut = limit;
    }

    format!("{}{}", text[..cut].trim_end(), ELLIPSIS)
}

fn parse_follow_ups(response: &str) -> Option<Vec<String>> {
    let questions: Vec<String> = parse_json_array(response)?;
    Some(
        questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(MAX_FOLLOW_UPS)
            .collect(),
    )
}
