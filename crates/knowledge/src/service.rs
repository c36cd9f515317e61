//! The knowledge service: one entry point for ingestion, answering and
//! verification.
//!
//! All collaborators are injected at construction; the service itself holds
//! no mutable state, so one instance can serve concurrent requests.

use crate::chunk::Chunker;
use crate::config::{self, KnowledgeConfig};
use crate::embeddings::{create_provider, Embedder, EmbeddingProvider};
use crate::gateway::ChunkGateway;
use crate::rag::{AnswerGenerator, GeneratorSettings, HybridRetriever};
use crate::store::{ChunkStore, SessionStore, SqliteChunkStore};
use crate::types::{
    ChatResponse, Chunk, Claim, DocumentRecord, DocumentType, FaithfulnessResult,
    GeneratedAnswer, IngestReport, RetrievedChunk, SearchFilters, SourcePassage, VerifiedClaim,
};
use crate::verify::FaithfulnessVerifier;
use askbase_core::{AppConfig, AppError, AppResult};
use askbase_llm::{create_client, ChatMessage, LlmClient};
use askbase_prompt::PromptLibrary;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// External collaborators of the service.
pub struct Collaborators {
    pub store: Arc<dyn ChunkStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<PromptLibrary>,
}

#[derive(Clone)]
pub struct KnowledgeService {
    chunker: Chunker,
    embedder: Embedder,
    gateway: ChunkGateway,
    store: Arc<dyn ChunkStore>,
    sessions: Arc<dyn SessionStore>,
    retriever: HybridRetriever,
    generator: AnswerGenerator,
    verifier: FaithfulnessVerifier,
    top_k: usize,
    history_turns: usize,
    verify_answers: bool,
}

impl KnowledgeService {
    /// Assemble the service from configuration and collaborators.
    ///
    /// `default_model` is used for any generation tier the config leaves
    /// unset.
    pub fn new(config: &KnowledgeConfig, default_model: &str, deps: Collaborators) -> Self {
        let generation = &config.generation;
        let fast_model = generation
            .fast_model
            .clone()
            .unwrap_or_else(|| default_model.to_string());
        let heavy_model = generation
            .heavy_model
            .clone()
            .unwrap_or_else(|| fast_model.clone());

        let table = config.strategy_table();
        let embedder = Embedder::from_config(deps.embeddings.clone(), &config.embedding);
        let gateway = ChunkGateway::new(
            deps.store.clone(),
            table.clone(),
            deps.embeddings.dimensions(),
        );
        let retriever = HybridRetriever::new(
            deps.store.clone(),
            embedder.clone(),
            config.retrieval.weights(),
        );
        let generator = AnswerGenerator::new(
            deps.llm.clone(),
            deps.prompts.clone(),
            GeneratorSettings {
                fast_model: fast_model.clone(),
                heavy_model,
                history_turns: generation.history_turns,
                follow_up_questions: generation.follow_up_questions,
            },
        );
        let verifier = FaithfulnessVerifier::new(deps.llm, deps.prompts, fast_model);

        Self {
            chunker: Chunker::new(table),
            embedder,
            gateway,
            store: deps.store,
            sessions: deps.sessions,
            retriever,
            generator,
            verifier,
            top_k: config.retrieval.top_k,
            history_turns: generation.history_turns,
            verify_answers: generation.verify_answers,
        }
    }

    /// Open the service for a workspace: knowledge config, SQLite store,
    /// embedding provider, LLM client and prompt overrides.
    pub fn open(app: &AppConfig) -> AppResult<Self> {
        let workspace = app.workspace.as_path();
        let config = config::load_config(workspace)?;

        let store = Arc::new(SqliteChunkStore::open(&config.store_path(workspace))?);
        let embeddings = create_provider(&config.embedding)?;
        let endpoint = app.provider_endpoint(&app.provider);
        let api_key = app.resolve_api_key(&app.provider);
        let llm = create_client(&app.provider, endpoint.as_deref(), api_key.as_deref())?;
        let prompts = Arc::new(PromptLibrary::load(workspace)?);

        info!(
            "Knowledge service ready: embeddings {} ({}), llm {} ({})",
            embeddings.provider_name(),
            embeddings.model_name(),
            llm.provider_name(),
            app.model
        );

        Ok(Self::new(
            &config,
            &app.model,
            Collaborators {
                store: store.clone(),
                sessions: store,
                embeddings,
                llm,
                prompts,
            },
        ))
    }

    /// Override whether `chat` verifies its answers.
    pub fn with_verify_answers(mut self, verify: bool) -> Self {
        self.verify_answers = verify;
        self
    }

    // Ingestion

    pub fn chunk_document(
        &self,
        document_id: &str,
        raw_text: &str,
        document_type: DocumentType,
        language: &str,
        topics: &[String],
    ) -> AppResult<Vec<Chunk>> {
        self.chunker
            .chunk(document_id, raw_text, document_type, language, topics)
    }

    pub async fn generate_embeddings(&self, chunks: Vec<Chunk>) -> AppResult<Vec<Chunk>> {
        self.embedder.embed_chunks(chunks).await
    }

    pub async fn store_chunks(&self, chunks: Vec<Chunk>) -> AppResult<Vec<Chunk>> {
        self.gateway.store(chunks).await
    }

    pub async fn get_chunks_for_resource(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        self.gateway.get_by_document(document_id).await
    }

    pub async fn delete_chunks_for_resource(&self, document_id: &str) -> AppResult<usize> {
        self.gateway.delete_by_document(document_id).await
    }

    pub async fn register_document(&self, document: &DocumentRecord) -> AppResult<()> {
        if document.id.trim().is_empty() {
            return Err(AppError::Validation(
                "Document id must not be empty".to_string(),
            ));
        }
        self.store.upsert_document(document).await
    }

    /// Chunk, embed, register and store a document, replacing any chunks it
    /// already had. Nothing is written when chunking fails.
    #[instrument(skip(self, document, raw_text), fields(document_id = %document.id))]
    pub async fn ingest_document(
        &self,
        document: &DocumentRecord,
        raw_text: &str,
    ) -> AppResult<IngestReport> {
        let chunks = self.chunk_document(
            &document.id,
            raw_text,
            document.document_type,
            &document.language,
            &document.topics,
        )?;
        let chunks_created = chunks.len();

        let chunks = self.generate_embeddings(chunks).await?;
        let chunks_embedded = chunks.iter().filter(|c| c.embedding.is_some()).count();

        self.register_document(document).await?;
        let replaced = self.gateway.delete_by_document(&document.id).await?;
        if replaced > 0 {
            info!("Replacing {} existing chunks", replaced);
        }
        let stored = self.store_chunks(chunks).await?;

        let report = IngestReport {
            document_id: document.id.clone(),
            chunks_created,
            chunks_embedded,
            chunks_stored: stored.len(),
        };
        info!(
            "Ingested '{}': {} chunks, {} embedded",
            document.id, report.chunks_stored, report.chunks_embedded
        );
        Ok(report)
    }

    // Query

    /// Hybrid retrieval; `top_k` defaults to the configured value.
    pub async fn retrieve_context(
        &self,
        query: &str,
        top_k: Option<usize>,
        filters: &SearchFilters,
    ) -> Vec<RetrievedChunk> {
        self.retriever
            .retrieve(query, top_k.unwrap_or(self.top_k), filters)
            .await
    }

    pub async fn generate_answer(
        &self,
        query: &str,
        context: &[RetrievedChunk],
        history: &[ChatMessage],
    ) -> AppResult<GeneratedAnswer> {
        self.generator.generate(query, context, history).await
    }

    /// One conversational turn.
    ///
    /// Without a session id a new session is started. The turn is appended
    /// to the session once the answer exists; a failed turn leaves the
    /// history untouched.
    #[instrument(skip(self, query, filters))]
    pub async fn chat(
        &self,
        query: &str,
        session_id: Option<&str>,
        filters: &SearchFilters,
    ) -> AppResult<ChatResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("Query must not be empty".to_string()));
        }

        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let history = self
            .sessions
            .recent_messages(&session_id, self.history_turns)
            .await?;

        let context = self.retrieve_context(query, None, filters).await;
        let answer = self.generate_answer(query, &context, &history).await?;

        let faithfulness = if self.verify_answers {
            let sources: Vec<SourcePassage> = context.iter().map(SourcePassage::from).collect();
            match self.verifier.verify(&answer.answer, &sources).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Answer verification skipped: {}", e);
                    None
                }
            }
        } else {
            None
        };

        self.sessions
            .append_message(&session_id, &ChatMessage::user(query))
            .await?;
        self.sessions
            .append_message(&session_id, &ChatMessage::assistant(answer.answer.clone()))
            .await?;

        Ok(ChatResponse {
            session_id,
            answer,
            faithfulness,
        })
    }

    // Verification

    pub async fn verify_faithfulness(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<FaithfulnessResult> {
        self.verifier.verify(answer, sources).await
    }

    pub async fn extract_claims(&self, answer: &str) -> AppResult<Vec<Claim>> {
        self.verifier.extract_claims(answer).await
    }

    pub async fn verify_claim(&self, claim: &str, sources: &[SourcePassage]) -> VerifiedClaim {
        self.verifier
            .verify_claim(Claim::new(claim.trim(), 1.0), sources)
            .await
    }

    pub async fn verify_claims_batch(
        &self,
        claims: &[String],
        sources: &[SourcePassage],
    ) -> Vec<VerifiedClaim> {
        self.verifier.verify_claims_batch(claims, sources).await
    }

    pub async fn get_faithfulness_score(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<f32> {
        self.verifier.faithfulness_score(answer, sources).await
    }

    pub async fn detect_hallucinations(
        &self,
        answer: &str,
        sources: &[SourcePassage],
    ) -> AppResult<Vec<String>> {
        self.verifier.detect_hallucinations(answer, sources).await
    }

    /// Stored chunks of a document as verification sources.
    pub async fn sources_for_resource(&self, document_id: &str) -> AppResult<Vec<SourcePassage>> {
        let chunks = self.get_chunks_for_resource(document_id).await?;
        Ok(chunks.iter().map(SourcePassage::from).collect())
    }

    /// A document record by id.
    pub async fn document(&self, document_id: &str) -> AppResult<Option<DocumentRecord>> {
        let mut found = self.store.documents(&[document_id.to_string()]).await?;
        Ok(found.remove(document_id))
    }
}
