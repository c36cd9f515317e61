//! Chunk store gateway: the validated write path into the store.

use crate::chunk::StrategyTable;
use crate::store::ChunkStore;
use crate::types::{Chunk, ChunkSchema};
use askbase_core::AppResult;
use chrono::Utc;
use std::sync::Arc;

/// Validates chunks before they reach the store and scopes reads and
/// deletes to a single document.
#[derive(Clone)]
pub struct ChunkGateway {
    store: Arc<dyn ChunkStore>,
    table: StrategyTable,
    dimensions: usize,
}

impl ChunkGateway {
    pub fn new(store: Arc<dyn ChunkStore>, table: StrategyTable, dimensions: usize) -> Self {
        Self {
            store,
            table,
            dimensions,
        }
    }

    fn schema_for(&self, chunk: &Chunk) -> ChunkSchema {
        match self.table.get(chunk.metadata.document_type) {
            Some(strategy) => strategy.schema(Some(self.dimensions)),
            None => self.table.widest_schema(Some(self.dimensions)),
        }
    }

    /// Persist chunks in one bulk write.
    ///
    /// Every chunk is validated first; one invalid chunk fails the whole call
    /// and nothing is written. Chunks without an id get a fresh one, chunks
    /// with an id replace the stored chunk. Returns the chunks as stored.
    pub async fn store(&self, chunks: Vec<Chunk>) -> AppResult<Vec<Chunk>> {
        for chunk in &chunks {
            self.schema_for(chunk).validate(chunk)?;
        }

        let now = Utc::now();
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .map(|mut chunk| {
                if chunk.id.is_none() {
                    chunk.id = Some(uuid::Uuid::new_v4().to_string());
                    chunk.created_at = now;
                }
                chunk.updated_at = now;
                chunk
            })
            .collect();

        let written = self.store.upsert_chunks(&chunks).await?;
        tracing::info!("Stored {} chunks", written);

        Ok(chunks)
    }

    pub async fn get_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        self.store.chunks_by_document(document_id).await
    }

    pub async fn delete_by_document(&self, document_id: &str) -> AppResult<usize> {
        let deleted = self.store.delete_by_document(document_id).await?;
        tracing::info!("Deleted {} chunks of '{}'", deleted, document_id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteChunkStore;
    use crate::types::{ChunkMetadata, DocumentType};

    fn chunk(content: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: None,
            document_id: "doc".to_string(),
            position: 0,
            content: content.to_string(),
            embedding,
            source_section: "Overview".to_string(),
            page_number: None,
            char_start: 0,
            char_end: content.chars().count(),
            metadata: ChunkMetadata {
                document_type: DocumentType::AuditReport,
                language: "en".to_string(),
                topics: vec![],
                content_hash: String::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn gateway() -> ChunkGateway {
        let store = Arc::new(SqliteChunkStore::open_in_memory().unwrap());
        ChunkGateway::new(store, StrategyTable::default(), 3)
    }

    #[tokio::test]
    async fn test_store_assigns_ids_and_round_trips() {
        let gateway = gateway();
        let content = "a".repeat(150);

        let stored = gateway
            .store(vec![chunk(&content, Some(vec![0.1, 0.2, 0.3]))])
            .await
            .unwrap();
        let id = stored[0].id.clone().unwrap();

        let read = gateway.get_by_document("doc").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id.as_deref(), Some(id.as_str()));

        // Same id again replaces instead of inserting
        let mut again = stored[0].clone();
        again.content = "b".repeat(150);
        gateway.store(vec![again]).await.unwrap();
        let read = gateway.get_by_document("doc").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].content, "b".repeat(150));
    }

    #[tokio::test]
    async fn test_one_invalid_chunk_fails_everything() {
        let gateway = gateway();
        let good = chunk(&"a".repeat(150), None);
        let too_short = chunk("short", None);

        let err = gateway.store(vec![good, too_short]).await.unwrap_err();
        assert!(err.is_validation());
        assert!(gateway.get_by_document("doc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let gateway = gateway();
        let err = gateway
            .store(vec![chunk(&"a".repeat(150), Some(vec![1.0]))])
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_delete_returns_count() {
        let gateway = gateway();
        gateway
            .store(vec![chunk(&"a".repeat(150), None), chunk(&"b".repeat(150), None)])
            .await
            .unwrap();

        assert_eq!(gateway.delete_by_document("doc").await.unwrap(), 2);
        assert_eq!(gateway.delete_by_document("doc").await.unwrap(), 0);
    }
}
