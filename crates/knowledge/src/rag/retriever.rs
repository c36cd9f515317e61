//! Hybrid retrieval: vector and lexical search fused into one ranking.

use super::fusion::{weighted_fusion, FusedChunk, FusionWeights};
use crate::embeddings::Embedder;
use crate::store::ChunkStore;
use crate::types::{RetrievedChunk, SearchFilters};
use askbase_core::AppResult;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rank-based relevance `1 - 0.1 * index`: 1.0 for the first result, 0.1
/// less for each next one. Not clamped, so ranks past 10 go negative.
pub fn rank_relevance(index: usize) -> f32 {
    (10.0 - index as f32) / 10.0
}

/// Runs both searches and merges them.
#[derive(Clone)]
pub struct HybridRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Embedder,
    weights: FusionWeights,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Embedder, weights: FusionWeights) -> Self {
        Self {
            store,
            embedder,
            weights,
        }
    }

    /// Retrieve up to `top_k` chunks, most relevant first.
    ///
    /// Never fails: any embedding or search error is logged and yields an
    /// empty list, which callers treat as "no context found".
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Vec<RetrievedChunk> {
        match self.try_retrieve(query, top_k, filters).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Retrieval failed, continuing without context: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<RetrievedChunk>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;

        let (vector_hits, text_hits) = tokio::join!(
            self.store.vector_search(&query_embedding, top_k, filters),
            self.store.text_search(query, top_k, filters),
        );
        let (vector_hits, text_hits) = (vector_hits?, text_hits?);

        debug!(
            "Candidates: {} vector, {} lexical",
            vector_hits.len(),
            text_hits.len()
        );

        let fused = weighted_fusion(vector_hits, text_hits, self.weights, top_k);
        let enriched = self.enrich(fused).await?;

        info!(
            "Retrieved {} chunks for query ({} chars)",
            enriched.len(),
            query.chars().count()
        );
        Ok(enriched)
    }

    /// Attach parent document metadata, dropping chunks whose document is gone.
    async fn enrich(&self, fused: Vec<FusedChunk>) -> AppResult<Vec<RetrievedChunk>> {
        let mut document_ids: Vec<String> = Vec::new();
        for candidate in &fused {
            if !document_ids.contains(&candidate.chunk.document_id) {
                document_ids.push(candidate.chunk.document_id.clone());
            }
        }

        let documents = if document_ids.is_empty() {
            HashMap::new()
        } else {
            self.store.documents(&document_ids).await?
        };

        let results = fused
            .into_iter()
            .filter_map(|candidate| {
                let Some(document) = documents.get(&candidate.chunk.document_id) else {
                    debug!(
                        "Dropping chunk {}: document '{}' not found",
                        candidate.chunk.display_id(),
                        candidate.chunk.document_id
                    );
                    return None;
                };
                Some((candidate, document.title.clone(), document.url.clone()))
            })
            .enumerate()
            .map(|(index, (candidate, title, url))| RetrievedChunk {
                chunk: candidate.chunk,
                document_title: title,
                document_url: url,
                relevance: rank_relevance(index),
                fused_score: candidate.score,
            })
            .collect();

        Ok(results)
    }
}
