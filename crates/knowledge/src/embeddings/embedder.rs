//! Batched chunk embedding.

use crate::embeddings::{EmbeddingConfig, EmbeddingProvider};
use crate::types::Chunk;
use askbase_core::{AppError, AppResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Attaches embeddings to chunks that lack one.
///
/// Chunks are embedded in fixed-size batches: all chunks of a batch
/// concurrently, batches one after another with a pause in between. A chunk
/// whose embedding fails is left without one. Only an unreachable provider
/// fails the whole call.
#[derive(Debug, Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    batch_delay: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(
            provider,
            config.batch_size,
            Duration::from_millis(config.batch_delay_ms),
        )
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed every chunk that has no embedding yet. Order is preserved.
    pub async fn embed_chunks(&self, mut chunks: Vec<Chunk>) -> AppResult<Vec<Chunk>> {
        let pending: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            tracing::debug!("All {} chunks already embedded", chunks.len());
            return Ok(chunks);
        }

        let expected = self.provider.dimensions();
        let mut embedded = 0usize;
        let mut failed = 0usize;

        for (batch_index, batch) in pending.chunks(self.batch_size).enumerate() {
            if batch_index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|&i| self.provider.embed(&chunks[i].content)),
            )
            .await;

            for (&i, result) in batch.iter().zip(results) {
                match result {
                    Ok(vector) if vector.len() == expected => {
                        chunks[i].embedding = Some(vector);
                        embedded += 1;
                    }
                    Ok(vector) => {
                        failed += 1;
                        tracing::warn!(
                            "Skipping chunk {} of '{}': embedding has {} dimensions, expected {}",
                            chunks[i].position,
                            chunks[i].document_id,
                            vector.len(),
                            expected
                        );
                    }
                    Err(e @ AppError::Unavailable(_)) => return Err(e),
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            "Skipping chunk {} of '{}': {}",
                            chunks[i].position,
                            chunks[i].document_id,
                            e
                        );
                    }
                }
            }

            tracing::debug!(
                "Embedded batch {} ({} chunks)",
                batch_index + 1,
                batch.len()
            );
        }

        tracing::info!(
            "Embedded {} of {} pending chunks with {} ({} failed)",
            embedded,
            pending.len(),
            self.provider.model_name(),
            failed
        );

        Ok(chunks)
    }

    /// Embed a query string with the same provider used for chunks.
    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f32>> {
        let vector = self.provider.embed(query).await?;
        if vector.len() != self.provider.dimensions() {
            return Err(AppError::Knowledge(format!(
                "Query embedding has {} dimensions, expected {}",
                vector.len(),
                self.provider.dimensions()
            )));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use crate::types::{ChunkMetadata, DocumentType};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn chunk(position: u32, content: &str) -> Chunk {
        Chunk {
            id: None,
            document_id: "doc".to_string(),
            position,
            content: content.to_string(),
            embedding: None,
            source_section: "Section 1".to_string(),
            page_number: None,
            char_start: 0,
            char_end: content.chars().count(),
            metadata: ChunkMetadata {
                document_type: DocumentType::Guidance,
                language: "en".to_string(),
                topics: vec![],
                content_hash: String::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Fails on texts containing "fail", or on everything when unreachable.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        unreachable: bool,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            if self.unreachable {
                return Err(AppError::Unavailable("connection refused".to_string()));
            }
            if texts.iter().any(|t| t.contains("fail")) {
                return Err(AppError::Llm("model error".to_string()));
            }
            if texts.iter().any(|t| t.contains("slow")) {
                return Err(AppError::Llm("embedding request timed out".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }
    }

    #[tokio::test]
    async fn test_embeds_missing_and_keeps_order() {
        let embedder = Embedder::new(Arc::new(MockProvider::new(16)), 2, Duration::ZERO);
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(i, &format!("cooling water report number {}", i)))
            .collect();

        let out = embedder.embed_chunks(chunks).await.unwrap();
        assert_eq!(out.len(), 5);
        for (i, c) in out.iter().enumerate() {
            assert_eq!(c.position, i as u32);
            assert_eq!(c.embedding.as_ref().map(Vec::len), Some(16));
        }
    }

    #[tokio::test]
    async fn test_already_embedded_chunks_are_skipped() {
        let provider = Arc::new(ScriptedProvider::default());
        let embedder = Embedder::new(provider.clone(), 10, Duration::ZERO);

        let mut done = chunk(0, "already embedded");
        done.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        let out = embedder
            .embed_chunks(vec![done, chunk(1, "needs embedding")])
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out[0].embedding, Some(vec![1.0, 0.0, 0.0, 0.0]));
        assert_eq!(out[1].embedding, Some(vec![0.5; 4]));
    }

    #[tokio::test]
    async fn test_per_chunk_failure_is_skipped() {
        let embedder = Embedder::new(Arc::new(ScriptedProvider::default()), 10, Duration::ZERO);
        let out = embedder
            .embed_chunks(vec![chunk(0, "fine"), chunk(1, "please fail"), chunk(2, "fine too")])
            .await
            .unwrap();

        assert!(out[0].embedding.is_some());
        assert!(out[1].embedding.is_none());
        assert!(out[2].embedding.is_some());
    }

    #[tokio::test]
    async fn test_timed_out_chunk_does_not_fail_the_call() {
        let embedder = Embedder::new(Arc::new(ScriptedProvider::default()), 10, Duration::ZERO);
        let out = embedder
            .embed_chunks(vec![
                chunk(0, "fine"),
                chunk(1, "slow oversized chunk"),
                chunk(2, "fine too"),
            ])
            .await
            .unwrap();

        assert!(out[0].embedding.is_some());
        assert!(out[1].embedding.is_none());
        assert!(out[2].embedding.is_some());
    }

    /// Records how many embed calls overlap and when each one starts.
    #[derive(Debug, Default)]
    struct ConcurrencyProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        starts: Mutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for ConcurrencyProvider {
        fn provider_name(&self) -> &str {
            "concurrency"
        }

        fn model_name(&self) -> &str {
            "concurrency"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.starts.lock().unwrap().push(Instant::now());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_concurrently_with_delay_between() {
        let provider = Arc::new(ConcurrencyProvider::default());
        let embedder = Embedder::new(provider.clone(), 10, Duration::from_millis(200));
        let chunks: Vec<Chunk> = (0..25).map(|i| chunk(i, &format!("text {}", i))).collect();

        let started = Instant::now();
        let out = embedder.embed_chunks(chunks).await.unwrap();
        let elapsed = started.elapsed();

        assert!(out.iter().all(|c| c.embedding.is_some()));
        assert_eq!(provider.peak.load(Ordering::SeqCst), 10);

        // Group call start times separated by more than the in-batch work
        let mut starts = provider.starts.lock().unwrap().clone();
        starts.sort();
        let mut batches = vec![1usize];
        for pair in starts.windows(2) {
            if pair[1] - pair[0] > Duration::from_millis(100) {
                batches.push(1);
            } else if let Some(last) = batches.last_mut() {
                *last += 1;
            }
        }
        assert_eq!(batches, vec![10, 10, 5]);

        // 3 batches of 10ms work plus 2 delays of 200ms
        assert!(elapsed >= Duration::from_millis(430), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(600), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_skipped() {
        let embedder = Embedder::new(Arc::new(MismatchedProvider), 10, Duration::ZERO);
        let out = embedder.embed_chunks(vec![chunk(0, "text")]).await.unwrap();
        assert!(out[0].embedding.is_none());
    }

    /// Reports 4 dimensions but returns 3.
    #[derive(Debug)]
    struct MismatchedProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for MismatchedProvider {
        fn provider_name(&self) -> &str {
            "mismatched"
        }

        fn model_name(&self) -> &str {
            "mismatched"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; 3]).collect())
        }
    }

    #[tokio::test]
    async fn test_unavailable_provider_aborts() {
        let provider = ScriptedProvider {
            unreachable: true,
            ..Default::default()
        };
        let embedder = Embedder::new(Arc::new(provider), 10, Duration::ZERO);
        let err = embedder
            .embed_chunks(vec![chunk(0, "anything")])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_embed_query() {
        let embedder = Embedder::new(Arc::new(MockProvider::new(32)), 10, Duration::ZERO);
        let vector = embedder.embed_query("cooling water").await.unwrap();
        assert_eq!(vector.len(), 32);
    }
}
