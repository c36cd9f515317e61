//! Weighted score fusion of vector and lexical candidate lists.

use crate::types::{Chunk, ScoredChunk};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight applied to each retrieval signal before accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f32,
    pub text: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.7,
            text: 0.3,
        }
    }
}

/// A chunk with its accumulated fused score.
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Merge two ranked lists into one.
///
/// Each hit contributes `score * weight` to its chunk's total; a chunk in
/// both lists gets both contributions. Result is sorted by total descending
/// (ties keep first-seen order, vector hits first) and cut to `top_k`.
/// Hits without an id cannot be merged and are ignored.
pub fn weighted_fusion(
    vector_hits: Vec<ScoredChunk>,
    text_hits: Vec<ScoredChunk>,
    weights: FusionWeights,
    top_k: usize,
) -> Vec<FusedChunk> {
    let mut order: Vec<String> = Vec::new();
    let mut fused: HashMap<String, FusedChunk> = HashMap::new();

    let weighted = vector_hits
        .into_iter()
        .map(|hit| (hit, weights.vector))
        .chain(text_hits.into_iter().map(|hit| (hit, weights.text)));

    for (hit, weight) in weighted {
        let Some(id) = hit.chunk.id.clone() else {
            continue;
        };
        let contribution = hit.score * weight;

        match fused.get_mut(&id) {
            Some(entry) => entry.score += contribution,
            None => {
                order.push(id.clone());
                fused.insert(
                    id,
                    FusedChunk {
                        chunk: hit.chunk,
                        score: contribution,
                    },
                );
            }
        }
    }

    let mut results: Vec<FusedChunk> = order
        .into_iter()
        .filter_map(|id| fused.remove(&id))
        .collect();

    // Stable sort keeps first-seen order among equal scores
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, DocumentType};
    use chrono::Utc;

    fn hit(id: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: Some(id.to_string()),
                document_id: "doc".to_string(),
                position: 0,
                content: format!("content {}", id),
                embedding: None,
                source_section: "Section 1".to_string(),
                page_number: None,
                char_start: 0,
                char_end: 10,
                metadata: ChunkMetadata {
                    document_type: DocumentType::Guidance,
                    language: "en".to_string(),
                    topics: vec![],
                    content_hash: String::new(),
                },
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            score,
        }
    }

    fn ids(results: &[FusedChunk]) -> Vec<&str> {
        results
            .iter()
            .filter_map(|r| r.chunk.id.as_deref())
            .collect()
    }

    #[test]
    fn test_weights_applied() {
        let results = weighted_fusion(
            vec![hit("v", 1.0)],
            vec![hit("t", 1.0)],
            FusionWeights::default(),
            10,
        );
        assert_eq!(ids(&results), vec!["v", "t"]);
        assert!((results[0].score - 0.7).abs() < 1e-6);
        assert!((results[1].score - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_presence_in_both_lists_accumulates() {
        let results = weighted_fusion(
            vec![hit("a", 0.5), hit("both", 0.5)],
            vec![hit("both", 0.5), hit("b", 0.9)],
            FusionWeights::default(),
            10,
        );

        assert_eq!(results[0].chunk.id.as_deref(), Some("both"));
        assert!((results[0].score - 0.5).abs() < 1e-6);
        let single = results
            .iter()
            .find(|r| r.chunk.id.as_deref() == Some("a"))
            .unwrap();
        assert!(results[0].score > single.score);
    }

    #[test]
    fn test_sorted_descending_and_truncated() {
        let results = weighted_fusion(
            vec![hit("a", 0.2), hit("b", 0.9), hit("c", 0.5)],
            vec![hit("d", 0.99)],
            FusionWeights::default(),
            3,
        );
        assert_eq!(ids(&results), vec!["b", "c", "d"]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let results = weighted_fusion(
            vec![hit("x", 0.5), hit("y", 0.5)],
            vec![],
            FusionWeights::default(),
            10,
        );
        assert_eq!(ids(&results), vec!["x", "y"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(weighted_fusion(vec![], vec![], FusionWeights::default(), 5).is_empty());
    }
}
