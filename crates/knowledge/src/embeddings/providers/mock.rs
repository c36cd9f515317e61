//! Deterministic hashing embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use askbase_core::AppResult;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "does", "do",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Polynomial byte hash.
fn hash_bytes(bytes: impl IntoIterator<Item = u8>, multiplier: u64) -> u64 {
    bytes
        .into_iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(multiplier).wrapping_add(b as u64))
}

/// Offline provider for tests and local development.
///
/// Each significant word adds weight to the dimensions its character
/// trigrams and the whole word hash to, so texts sharing vocabulary get
/// high cosine similarity. Output is unit length, or all zeros for text
/// with no significant words.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
    model: String,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self::with_model(dimensions, "trigram-v1")
    }

    pub fn with_model(dimensions: usize, model: &str) -> Self {
        Self {
            dimensions: dimensions.max(1),
            model: model.to_string(),
        }
    }

    fn word_frequencies(text: &str) -> HashMap<String, usize> {
        let mut frequencies = HashMap::new();
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !stop_words().contains(w))
        {
            *frequencies.entry(word.to_string()).or_insert(0) += 1;
        }
        frequencies
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for (word, freq) in Self::word_frequencies(text) {
            let chars: Vec<char> = word.chars().collect();
            let trigram_weight = (freq as f32).sqrt();
            for window in chars.windows(3) {
                let hash = hash_bytes(
                    window.iter().collect::<String>().into_bytes(),
                    37,
                );
                vector[(hash % self.dimensions as u64) as usize] += trigram_weight;
            }

            let hash = hash_bytes(word.bytes(), 31);
            vector[(hash % self.dimensions as u64) as usize] += freq as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}
