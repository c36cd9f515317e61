//! Document store abstraction.
//!
//! [`ChunkStore`] is what the pipeline needs from a document store:
//! bulk upsert, per-document reads and deletes, similarity search over
//! embeddings and full-text search over content, both constrained by
//! [`SearchFilters`]. [`SessionStore`] keeps chat history per session.

mod sqlite;

pub use sqlite::SqliteChunkStore;

use crate::types::{Chunk, DocumentRecord, ScoredChunk, SearchFilters};
use askbase_core::AppResult;
use askbase_llm::ChatMessage;
use std::collections::HashMap;

/// Persistence for chunks and their parent documents.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert or replace a parent document record.
    async fn upsert_document(&self, document: &DocumentRecord) -> AppResult<()>;

    /// Fetch document records by id. Unknown ids are absent from the map.
    async fn documents(&self, ids: &[String]) -> AppResult<HashMap<String, DocumentRecord>>;

    /// Insert chunks, replacing any stored chunk with the same id.
    ///
    /// Every chunk must carry an id. Returns the number of chunks written.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> AppResult<usize>;

    /// Chunks of one document, ordered by position.
    async fn chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>>;

    /// Delete all chunks of one document. Returns the number deleted.
    async fn delete_by_document(&self, document_id: &str) -> AppResult<usize>;

    /// Up to `top_k` embedded chunks by descending similarity to `embedding`.
    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>>;

    /// Up to `top_k` chunks by descending full-text relevance to `query`.
    async fn text_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>>;
}

/// Chat history keyed by session id.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn append_message(&self, session_id: &str, message: &ChatMessage) -> AppResult<()>;

    /// The last `limit` messages of a session, oldest first.
    async fn recent_messages(&self, session_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>>;
}

/// Cosine similarity; 0 for vectors of different length or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
