//! Cross-component tests over a fully wired [`KnowledgeService`].

mod chat;

use crate::config::KnowledgeConfig;
use crate::embeddings::providers::MockProvider;
use crate::service::{Collaborators, KnowledgeService};
use crate::store::SqliteChunkStore;
use crate::types::{DocumentRecord, DocumentType};
use askbase_core::{AppError, AppResult};
use askbase_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use askbase_prompt::PromptLibrary;
use std::sync::{Arc, Mutex};

pub(crate) const DIMS: usize = 64;

pub(crate) const GROUNDED_ANSWER: &str =
    "The campus draws about 4 million litres of cooling water per day [1].";

pub(crate) const NO_CONTEXT_ANSWER: &str =
    "I don't have information on this topic. Try rephrasing or broadening your filters.";

/// Language model double that answers by looking at the prompt.
///
/// Claim checks are answered from `verdicts` (claim prefix -> reply,
/// `UNKNOWN` when nothing matches); claim extraction replies with
/// `claims_reply` or fails so the heuristic takes over.
pub(crate) struct ScriptedLlm {
    pub verdicts: Vec<(String, String)>,
    pub claims_reply: Option<String>,
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            verdicts: Vec::new(),
            claims_reply: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verdict(mut self, claim: &str, verdict: &str) -> Self {
        self.verdicts.push((claim.to_string(), verdict.to_string()));
        self
    }

    pub fn with_claims_reply(mut self, reply: &str) -> Self {
        self.claims_reply = Some(reply.to_string());
        self
    }

    /// Requests whose system prompt contains `marker`.
    pub fn requests_with_system(&self, marker: &str) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system.as_deref().is_some_and(|s| s.contains(marker)))
            .cloned()
            .collect()
    }

    fn reply(&self, request: &LlmRequest) -> AppResult<String> {
        let user = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let system = request.system.as_deref().unwrap_or_default();

        if user.contains("Claim: ") {
            let verdict = self
                .verdicts
                .iter()
                .find(|(claim, _)| user.contains(&format!("Claim: {}", claim)))
                .map(|(_, verdict)| verdict.clone())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Ok(verdict);
        }
        if user.contains("Extract the atomic factual claims") {
            return self
                .claims_reply
                .clone()
                .ok_or_else(|| AppError::Llm("claim extraction unavailable".to_string()));
        }
        if user.contains("follow-up questions") {
            return Ok(r#"["How is the water reused?", "Who audits the figures?"]"#.to_string());
        }
        if system.contains("No documents in the knowledge base matched") {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }
        Ok(GROUNDED_ANSWER.to_string())
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let content = self.reply(request)?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

pub(crate) fn test_config() -> KnowledgeConfig {
    let mut config = KnowledgeConfig::default();
    config.embedding.dimensions = DIMS;
    config.embedding.batch_delay_ms = 0;
    config
}

pub(crate) fn service_with(config: &KnowledgeConfig, llm: Arc<ScriptedLlm>) -> KnowledgeService {
    let store = Arc::new(SqliteChunkStore::open_in_memory().unwrap());
    KnowledgeService::new(
        config,
        "test-model",
        Collaborators {
            store: store.clone(),
            sessions: store,
            embeddings: Arc::new(MockProvider::new(config.embedding.dimensions)),
            llm,
            prompts: Arc::new(PromptLibrary::builtin()),
        },
    )
}

pub(crate) fn service(llm: Arc<ScriptedLlm>) -> KnowledgeService {
    service_with(&test_config(), llm)
}

pub(crate) fn guidance_record(id: &str) -> DocumentRecord {
    DocumentRecord {
        id: id.to_string(),
        title: "Data Center Water Guidance".to_string(),
        url: Some("https://example.org/water-guidance".to_string()),
        document_type: DocumentType::Guidance,
        language: "en".to_string(),
        topics: vec!["water".to_string()],
    }
}

/// Guidance document with three level-2 headings, each section long enough
/// for the guidance minimum.
pub(crate) fn guidance_text() -> String {
    format!(
        "## Cooling Water\n{}\n\n## Power Usage\n{}\n\n## Land Use\n{}\n",
        "The campus draws about 4 million litres of cooling water per day from the municipal supply. "
            .repeat(3),
        "Annual electricity consumption is reported to the regulator together with the grid connection capacity. "
            .repeat(3),
        "The site occupies former farmland that was rezoned for industrial use by the county council. "
            .repeat(3),
    )
}
