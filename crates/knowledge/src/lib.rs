//! Retrieval-augmented question answering over a local document catalog.
//!
//! Ingestion: raw text goes through the [`Chunker`], the [`Embedder`] and the
//! [`ChunkGateway`] into a [`ChunkStore`]. Querying: the [`HybridRetriever`]
//! fuses vector and lexical search, the [`AnswerGenerator`] writes a cited
//! answer, and the [`FaithfulnessVerifier`] can check it claim by claim.
//! [`KnowledgeService`] wires all of it together.

pub mod chunk;
pub mod config;
pub mod embeddings;
pub mod gateway;
mod llm_output;
pub mod parser;
pub mod rag;
pub mod service;
pub mod store;
pub mod types;
pub mod verify;

#[cfg(test)]
mod tests;

pub use chunk::{Chunker, SplitStrategy, StrategyTable, TypeStrategy};
pub use config::{load_config, save_config, KnowledgeConfig};
pub use embeddings::{create_provider, Embedder, EmbeddingConfig, EmbeddingProvider};
pub use gateway::ChunkGateway;
pub use rag::{AnswerGenerator, FusionWeights, GeneratorSettings, HybridRetriever};
pub use service::{Collaborators, KnowledgeService};
pub use store::{ChunkStore, SessionStore, SqliteChunkStore};
pub use types::{
    AnswerConfidence, ChatResponse, Chunk, Citation, Claim, DocumentRecord, DocumentType,
    FaithfulnessConfidence, FaithfulnessResult, GeneratedAnswer, IngestReport, RetrievedChunk,
    SearchFilters, SourcePassage, VerifiedClaim,
};
pub use verify::FaithfulnessVerifier;
