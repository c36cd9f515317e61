//! SQLite-backed chunk and session store.
//!
//! Embeddings are stored as little-endian f32 BLOBs and scored with cosine
//! similarity in process. Lexical search uses an FTS5 table kept in step
//! with the chunks table; its `bm25()` rank is mapped into (0, 1).

use super::{cosine_similarity, ChunkStore, SessionStore};
use crate::types::{Chunk, ChunkMetadata, DocumentRecord, ScoredChunk, SearchFilters};
use askbase_core::{AppError, AppResult};
use askbase_llm::{ChatMessage, Role};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT,
    document_type TEXT NOT NULL,
    language TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB,
    source_section TEXT NOT NULL,
    page_number INTEGER,
    char_start INTEGER NOT NULL,
    char_end INTEGER NOT NULL,
    document_type TEXT NOT NULL,
    language TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, position);

CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    chunk_id UNINDEXED,
    content
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id);
"#;

const CHUNK_COLUMNS: &str = "c.id, c.document_id, c.position, c.content, c.embedding, \
    c.source_section, c.page_number, c.char_start, c.char_end, c.document_type, \
    c.language, c.topics, c.content_hash, c.created_at, c.updated_at";

/// Index of the first column after [`CHUNK_COLUMNS`].
const EXTRA_COLUMN: usize = 15;

fn store_error(context: &str, e: rusqlite::Error) -> AppError {
    AppError::Store(format!("{}: {}", context, e))
}

/// SQLite store for documents, chunks and chat sessions.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
}

impl SqliteChunkStore {
    /// Open (or create) a store file, creating parent directories as needed.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| store_error(&format!("Failed to open store at {:?}", path), e))?;
        tracing::debug!("Opened chunk store at {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| store_error("Failed to open in-memory store", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| store_error("Failed to initialize schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::Store(format!("Store lock poisoned: {}", e)))
    }

    fn write_document(&self, document: &DocumentRecord) -> AppResult<()> {
        let topics = serde_json::to_string(&document.topics)?;
        self.conn()?
            .execute(
                "INSERT INTO documents (id, title, url, document_type, language, topics)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    document_type = excluded.document_type,
                    language = excluded.language,
                    topics = excluded.topics",
                params![
                    document.id,
                    document.title,
                    document.url,
                    document.document_type.as_str(),
                    document.language,
                    topics
                ],
            )
            .map_err(|e| store_error("Failed to upsert document", e))?;
        Ok(())
    }

    fn read_documents(&self, ids: &[String]) -> AppResult<HashMap<String, DocumentRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, url, document_type, language, topics
                 FROM documents WHERE id = ?1",
            )
            .map_err(|e| store_error("Failed to prepare document query", e))?;

        let mut documents = HashMap::new();
        for id in ids {
            if documents.contains_key(id) {
                continue;
            }

            let row = stmt
                .query_row(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .optional()
                .map_err(|e| store_error("Failed to read document", e))?;

            if let Some((id, title, url, document_type, language, topics)) = row {
                let record = DocumentRecord {
                    document_type: document_type.parse().map_err(|e| corrupt(&id, e))?,
                    topics: serde_json::from_str(&topics)?,
                    id: id.clone(),
                    title,
                    url,
                    language,
                };
                documents.insert(id, record);
            }
        }

        Ok(documents)
    }

    fn write_chunks(&self, chunks: &[Chunk]) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        {
            let mut upsert = tx
                .prepare(
                    "INSERT INTO chunks (id, document_id, position, content, embedding,
                        source_section, page_number, char_start, char_end, document_type,
                        language, topics, content_hash, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                     ON CONFLICT(id) DO UPDATE SET
                        document_id = excluded.document_id,
                        position = excluded.position,
                        content = excluded.content,
                        embedding = excluded.embedding,
                        source_section = excluded.source_section,
                        page_number = excluded.page_number,
                        char_start = excluded.char_start,
                        char_end = excluded.char_end,
                        document_type = excluded.document_type,
                        language = excluded.language,
                        topics = excluded.topics,
                        content_hash = excluded.content_hash,
                        updated_at = excluded.updated_at",
                )
                .map_err(|e| store_error("Failed to prepare chunk upsert", e))?;
            let mut delete_fts = tx
                .prepare("DELETE FROM chunks_fts WHERE chunk_id = ?1")
                .map_err(|e| store_error("Failed to prepare FTS delete", e))?;
            let mut insert_fts = tx
                .prepare("INSERT INTO chunks_fts (chunk_id, content) VALUES (?1, ?2)")
                .map_err(|e| store_error("Failed to prepare FTS insert", e))?;

            for chunk in chunks {
                let id = chunk.id.as_deref().ok_or_else(|| {
                    AppError::Validation(format!(
                        "chunk {} of '{}' has no id",
                        chunk.position, chunk.document_id
                    ))
                })?;

                upsert
                    .execute(params![
                        id,
                        chunk.document_id,
                        chunk.position,
                        chunk.content,
                        chunk.embedding.as_deref().map(embedding_to_bytes),
                        chunk.source_section,
                        chunk.page_number,
                        chunk.char_start as i64,
                        chunk.char_end as i64,
                        chunk.metadata.document_type.as_str(),
                        chunk.metadata.language,
                        serde_json::to_string(&chunk.metadata.topics)?,
                        chunk.metadata.content_hash,
                        chunk.created_at.to_rfc3339(),
                        chunk.updated_at.to_rfc3339(),
                    ])
                    .map_err(|e| store_error("Failed to upsert chunk", e))?;
                delete_fts
                    .execute(params![id])
                    .map_err(|e| store_error("Failed to clear FTS row", e))?;
                insert_fts
                    .execute(params![id, chunk.content])
                    .map_err(|e| store_error("Failed to index chunk text", e))?;
            }
        }

        tx.commit()
            .map_err(|e| store_error("Failed to commit chunk upsert", e))?;
        Ok(chunks.len())
    }

    fn read_chunks(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM chunks c WHERE c.document_id = ?1 ORDER BY c.position",
                CHUNK_COLUMNS
            ))
            .map_err(|e| store_error("Failed to prepare chunk query", e))?;

        let rows = stmt
            .query_map(params![document_id], ChunkRow::from_row)
            .map_err(|e| store_error("Failed to query chunks", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error("Failed to read chunk row", e))?;

        rows.into_iter().map(ChunkRow::into_chunk).collect()
    }

    fn remove_chunks(&self, document_id: &str) -> AppResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        tx.execute(
            "DELETE FROM chunks_fts WHERE chunk_id IN (SELECT id FROM chunks WHERE document_id = ?1)",
            params![document_id],
        )
        .map_err(|e| store_error("Failed to delete FTS rows", e))?;
        let deleted = tx
            .execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])
            .map_err(|e| store_error("Failed to delete chunks", e))?;

        tx.commit()
            .map_err(|e| store_error("Failed to commit chunk delete", e))?;
        Ok(deleted)
    }

    fn similar_chunks(
        &self,
        embedding: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM chunks c WHERE c.embedding IS NOT NULL",
                CHUNK_COLUMNS
            ))
            .map_err(|e| store_error("Failed to prepare vector query", e))?;

        let rows = stmt
            .query_map([], ChunkRow::from_row)
            .map_err(|e| store_error("Failed to query embeddings", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error("Failed to read chunk row", e))?;

        let mut scored = Vec::new();
        for row in rows {
            let chunk = row.into_chunk()?;
            if !filters.matches(&chunk.metadata) {
                continue;
            }
            let score = chunk
                .embedding
                .as_deref()
                .map(|stored| cosine_similarity(embedding, stored))
                .unwrap_or(0.0);
            scored.push(ScoredChunk { chunk, score });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn matching_chunks(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, bm25(chunks_fts) AS bm25_rank
                 FROM chunks_fts f
                 JOIN chunks c ON c.id = f.chunk_id
                 WHERE chunks_fts MATCH ?1
                 ORDER BY bm25_rank",
                CHUNK_COLUMNS
            ))
            .map_err(|e| store_error("Failed to prepare text query", e))?;

        let rows = stmt
            .query_map(params![fts_query], |row| {
                Ok((ChunkRow::from_row(row)?, row.get::<_, f64>(EXTRA_COLUMN)?))
            })
            .map_err(|e| store_error("Failed to run text query", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error("Failed to read text match", e))?;

        let mut scored = Vec::new();
        for (row, rank) in rows {
            let chunk = row.into_chunk()?;
            if !filters.matches(&chunk.metadata) {
                continue;
            }
            scored.push(ScoredChunk {
                chunk,
                score: bm25_to_score(rank),
            });
            if scored.len() == top_k {
                break;
            }
        }

        Ok(scored)
    }

    fn write_message(&self, session_id: &str, message: &ChatMessage) -> AppResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO chat_messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    message.role.as_str(),
                    message.content,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| store_error("Failed to append chat message", e))?;
        Ok(())
    }

    fn read_messages(&self, session_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content FROM chat_messages
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| store_error("Failed to prepare history query", e))?;

        let rows = stmt
            .query_map(params![session_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| store_error("Failed to query history", e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| store_error("Failed to read history row", e))?;

        let mut messages = rows
            .into_iter()
            .map(|(role, content)| {
                role.parse::<Role>()
                    .map(|role| ChatMessage::new(role, content))
            })
            .collect::<AppResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[async_trait::async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn upsert_document(&self, document: &DocumentRecord) -> AppResult<()> {
        self.write_document(document)
    }

    async fn documents(&self, ids: &[String]) -> AppResult<HashMap<String, DocumentRecord>> {
        self.read_documents(ids)
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> AppResult<usize> {
        self.write_chunks(chunks)
    }

    async fn chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        self.read_chunks(document_id)
    }

    async fn delete_by_document(&self, document_id: &str) -> AppResult<usize> {
        self.remove_chunks(document_id)
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        self.similar_chunks(embedding, top_k, filters)
    }

    async fn text_search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<ScoredChunk>> {
        self.matching_chunks(query, top_k, filters)
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteChunkStore {
    async fn append_message(&self, session_id: &str, message: &ChatMessage) -> AppResult<()> {
        self.write_message(session_id, message)
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> AppResult<Vec<ChatMessage>> {
        self.read_messages(session_id, limit)
    }
}

/// Raw `chunks` row before type conversion.
struct ChunkRow {
    id: String,
    document_id: String,
    position: i64,
    content: String,
    embedding: Option<Vec<u8>>,
    source_section: String,
    page_number: Option<i64>,
    char_start: i64,
    char_end: i64,
    document_type: String,
    language: String,
    topics: String,
    content_hash: String,
    created_at: String,
    updated_at: String,
}

impl ChunkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            position: row.get(2)?,
            content: row.get(3)?,
            embedding: row.get(4)?,
            source_section: row.get(5)?,
            page_number: row.get(6)?,
            char_start: row.get(7)?,
            char_end: row.get(8)?,
            document_type: row.get(9)?,
            language: row.get(10)?,
            topics: row.get(11)?,
            content_hash: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_chunk(self) -> AppResult<Chunk> {
        let embedding = self
            .embedding
            .as_deref()
            .map(bytes_to_embedding)
            .transpose()?;

        Ok(Chunk {
            metadata: ChunkMetadata {
                document_type: self
                    .document_type
                    .parse()
                    .map_err(|e| corrupt(&self.id, e))?,
                language: self.language,
                topics: serde_json::from_str(&self.topics)?,
                content_hash: self.content_hash,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: Some(self.id),
            document_id: self.document_id,
            position: self.position as u32,
            content: self.content,
            embedding,
            source_section: self.source_section,
            page_number: self.page_number.map(|p| p as u32),
            char_start: self.char_start as usize,
            char_end: self.char_end as usize,
        })
    }
}

fn corrupt(id: &str, e: AppError) -> AppError {
    AppError::Store(format!("Corrupt row '{}': {}", id, e))
}

fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Store(format!("Invalid timestamp '{}': {}", value, e)))
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Store(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// OR-query of the quoted alphanumeric terms in `query`, if any.
fn fts_query(query: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }

    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Map an FTS5 bm25 rank (lower is better, usually negative) into (0, 1).
fn bm25_to_score(rank: f64) -> f32 {
    let magnitude = rank.abs();
    (magnitude / (1.0 + magnitude)) as f32
}
