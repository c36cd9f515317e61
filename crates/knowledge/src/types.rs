//! Knowledge system type definitions.

use askbase_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Kind of catalog document. Selects the chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Guidance,
    Policy,
    AuditReport,
    Playbook,
    CaseStudy,
    Dataset,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Guidance,
        DocumentType::Policy,
        DocumentType::AuditReport,
        DocumentType::Playbook,
        DocumentType::CaseStudy,
        DocumentType::Dataset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Guidance => "guidance",
            DocumentType::Policy => "policy",
            DocumentType::AuditReport => "audit_report",
            DocumentType::Playbook => "playbook",
            DocumentType::CaseStudy => "case_study",
            DocumentType::Dataset => "dataset",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| AppError::Validation(format!("Unknown document type: '{}'", s)))
    }
}

/// Parent document of a set of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    /// Canonical URL shown in citations
    pub url: Option<String>,
    pub document_type: DocumentType,
    pub language: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Metadata every chunk inherits from its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_type: DocumentType,
    pub language: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// SHA-256 of the chunk content
    pub content_hash: String,
}

/// A retrievable passage of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Assigned by the store gateway on first write
    pub id: Option<String>,
    pub document_id: String,
    /// Position within the document (0-indexed)
    pub position: u32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Heading title, marker text, or "Section N"
    pub source_section: String,
    pub page_number: Option<u32>,
    /// Char offset of the first content char in the source text
    pub char_start: usize,
    /// Char offset one past the last content char
    pub char_end: usize,
    pub metadata: ChunkMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unvalidated chunk produced by a splitter.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub document_id: String,
    pub position: u32,
    pub content: String,
    pub source_section: String,
    pub page_number: Option<u32>,
    pub char_start: usize,
    pub char_end: usize,
    pub document_type: DocumentType,
    pub language: String,
    pub topics: Vec<String>,
}

/// Shape constraints a chunk must satisfy at every trust boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSchema {
    pub min_chars: usize,
    pub max_chars: usize,
    /// Expected embedding dimensionality, when embeddings are checked
    pub dimensions: Option<usize>,
}

impl ChunkSchema {
    pub fn validate(&self, chunk: &Chunk) -> AppResult<()> {
        if chunk.document_id.trim().is_empty() {
            return Err(AppError::Validation("chunk has no document id".to_string()));
        }
        if chunk.source_section.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "chunk {} of '{}' has no source section",
                chunk.position, chunk.document_id
            )));
        }
        if chunk.char_end <= chunk.char_start {
            return Err(AppError::Validation(format!(
                "chunk {} of '{}' has empty span [{}, {})",
                chunk.position, chunk.document_id, chunk.char_start, chunk.char_end
            )));
        }

        let len = chunk.content.chars().count();
        if len < self.min_chars || len > self.max_chars {
            return Err(AppError::Validation(format!(
                "chunk {} of '{}' has {} chars, allowed range is [{}, {}]",
                chunk.position, chunk.document_id, len, self.min_chars, self.max_chars
            )));
        }

        if let (Some(expected), Some(embedding)) = (self.dimensions, chunk.embedding.as_ref()) {
            if embedding.len() != expected {
                return Err(AppError::Validation(format!(
                    "chunk {} of '{}' has a {}-dimensional embedding, expected {}",
                    chunk.position,
                    chunk.document_id,
                    embedding.len(),
                    expected
                )));
            }
        }

        Ok(())
    }
}

impl Chunk {
    /// Build a chunk from a splitter draft, rejecting it if it violates `schema`.
    pub fn from_draft(draft: ChunkDraft, schema: &ChunkSchema) -> AppResult<Chunk> {
        let now = Utc::now();
        let chunk = Chunk {
            id: None,
            document_id: draft.document_id,
            position: draft.position,
            metadata: ChunkMetadata {
                document_type: draft.document_type,
                language: draft.language,
                topics: draft.topics,
                content_hash: content_hash(&draft.content),
            },
            content: draft.content,
            embedding: None,
            source_section: draft.source_section,
            page_number: draft.page_number,
            char_start: draft.char_start,
            char_end: draft.char_end,
            created_at: now,
            updated_at: now,
        };
        schema.validate(&chunk)?;
        Ok(chunk)
    }

    /// Id or a placeholder for log lines.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unsaved>")
    }
}

/// Hex SHA-256 of text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Metadata constraints shared by vector and lexical search.
///
/// Empty sets mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Chunk must carry at least one of these topics
    #[serde(default)]
    pub topics: Vec<String>,

    /// Chunk's document type must be one of these
    #[serde(default)]
    pub document_types: Vec<DocumentType>,

    /// Chunk language must equal this (case-insensitive)
    #[serde(default)]
    pub language: Option<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_document_types(mut self, document_types: Vec<DocumentType>) -> Self {
        self.document_types = document_types;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.topics.is_empty() || !self.document_types.is_empty() || self.language.is_some()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if !self.document_types.is_empty()
            && !self.document_types.contains(&metadata.document_type)
        {
            return false;
        }

        if let Some(language) = &self.language {
            if !metadata.language.eq_ignore_ascii_case(language) {
                return false;
            }
        }

        if !self.topics.is_empty() {
            let any_topic = metadata
                .topics
                .iter()
                .any(|t| self.topics.iter().any(|f| f.eq_ignore_ascii_case(t)));
            if !any_topic {
                return false;
            }
        }

        true
    }
}

/// A chunk with a provider-computed search score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// A chunk enriched for answer generation. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub document_title: String,
    pub document_url: Option<String>,
    /// Rank-based score `1 - 0.1 * index` used for confidence buckets
    pub relevance: f32,
    /// Accumulated weighted vector + lexical score
    pub fused_score: f32,
}

/// Source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub resource_id: String,
    pub resource_title: String,
    pub chunk_id: String,
    /// At most 200 chars, cut at a word boundary and ending in "..." when cut
    pub excerpt: String,
    pub url: Option<String>,
    pub page: Option<u32>,
    pub section: Option<String>,
    /// Whether the answer text cites this source's bracket number
    pub referenced: bool,
}

/// Confidence bucket of a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerConfidence {
    High,
    Medium,
    Low,
    Uncertain,
}

impl AnswerConfidence {
    /// Bucket a mean relevance score.
    pub fn from_mean_relevance(mean: f32) -> Self {
        if mean > 0.8 {
            AnswerConfidence::High
        } else if mean > 0.6 {
            AnswerConfidence::Medium
        } else if mean > 0.4 {
            AnswerConfidence::Low
        } else {
            AnswerConfidence::Uncertain
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerConfidence::High => "high",
            AnswerConfidence::Medium => "medium",
            AnswerConfidence::Low => "low",
            AnswerConfidence::Uncertain => "uncertain",
        }
    }
}

/// Output of the answer generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub confidence: AnswerConfidence,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    /// Model that produced the answer
    pub model: String,
}

/// An atomic factual statement extracted from an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub statement: String,
    /// Always within [0, 1]
    pub confidence: f32,
}

impl Claim {
    /// Create a claim, clamping confidence into [0, 1]. NaN becomes 0.
    pub fn new(statement: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            statement: statement.into(),
            confidence,
        }
    }
}

/// A claim after checking it against sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedClaim {
    #[serde(flatten)]
    pub claim: Claim,
    pub supported: bool,
    pub source_ref: Option<String>,
}

/// Confidence bucket of a faithfulness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaithfulnessConfidence {
    High,
    Medium,
    Low,
    Hallucination,
}

impl FaithfulnessConfidence {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            FaithfulnessConfidence::High
        } else if score >= 0.7 {
            FaithfulnessConfidence::Medium
        } else if score >= 0.4 {
            FaithfulnessConfidence::Low
        } else {
            FaithfulnessConfidence::Hallucination
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaithfulnessConfidence::High => "high",
            FaithfulnessConfidence::Medium => "medium",
            FaithfulnessConfidence::Low => "low",
            FaithfulnessConfidence::Hallucination => "hallucination",
        }
    }
}

/// Result of verifying an answer against its sources. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaithfulnessResult {
    /// Fraction of supported claims, rounded to 2 decimals
    pub score: f32,
    pub claims: Vec<VerifiedClaim>,
    pub unsupported_claims: Vec<String>,
    pub confidence: FaithfulnessConfidence,
    pub reasoning: String,
}

/// A passage an answer is verified against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePassage {
    pub id: Option<String>,
    pub content: String,
}

impl SourcePassage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
        }
    }
}

impl From<&Chunk> for SourcePassage {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
        }
    }
}

impl From<&RetrievedChunk> for SourcePassage {
    fn from(retrieved: &RetrievedChunk) -> Self {
        Self::from(&retrieved.chunk)
    }
}

/// Counts reported by a document ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    pub chunks_stored: usize,
}

/// One chat turn: the answer plus an optional faithfulness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub answer: GeneratedAnswer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faithfulness: Option<FaithfulnessResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str) -> ChunkDraft {
        ChunkDraft {
            document_id: "doc-1".to_string(),
            position: 0,
            content: content.to_string(),
            source_section: "Overview".to_string(),
            page_number: None,
            char_start: 0,
            char_end: content.chars().count(),
            document_type: DocumentType::Guidance,
            language: "en".to_string(),
            topics: vec!["energy".to_string()],
        }
    }

    const SCHEMA: ChunkSchema = ChunkSchema {
        min_chars: 10,
        max_chars: 40,
        dimensions: Some(3),
    };

    #[test]
    fn test_document_type_parsing() {
        assert_eq!(
            "audit-report".parse::<DocumentType>().unwrap(),
            DocumentType::AuditReport
        );
        assert_eq!(" Guidance ".parse::<DocumentType>().unwrap(), DocumentType::Guidance);
        assert!("memo".parse::<DocumentType>().unwrap_err().is_validation());
    }

    #[test]
    fn test_from_draft_sets_hash_and_no_id() {
        let chunk = Chunk::from_draft(draft("Cooling uses recycled water."), &SCHEMA).unwrap();
        assert!(chunk.id.is_none());
        assert_eq!(chunk.metadata.content_hash.len(), 64);
        assert_eq!(chunk.metadata.content_hash, content_hash("Cooling uses recycled water."));
    }

    #[test]
    fn test_schema_rejects_length_out_of_range() {
        assert!(Chunk::from_draft(draft("short"), &SCHEMA).is_err());
        assert!(Chunk::from_draft(draft(&"x".repeat(41)), &SCHEMA).is_err());
    }

    #[test]
    fn test_schema_rejects_empty_span() {
        let mut d = draft("Cooling uses recycled water.");
        d.char_end = d.char_start;
        assert!(Chunk::from_draft(d, &SCHEMA).unwrap_err().is_validation());
    }

    #[test]
    fn test_schema_checks_embedding_dimensions() {
        let mut chunk = Chunk::from_draft(draft("Cooling uses recycled water."), &SCHEMA).unwrap();
        chunk.embedding = Some(vec![0.1, 0.2]);
        assert!(SCHEMA.validate(&chunk).is_err());
        chunk.embedding = Some(vec![0.1, 0.2, 0.3]);
        assert!(SCHEMA.validate(&chunk).is_ok());
    }

    #[test]
    fn test_claim_confidence_is_clamped() {
        assert_eq!(Claim::new("a", 2.0).confidence, 1.0);
        assert_eq!(Claim::new("a", -1.0).confidence, 0.0);
        assert_eq!(Claim::new("a", f32::NAN).confidence, 0.0);
        assert_eq!(Claim::new("a", 0.42).confidence, 0.42);
    }

    #[test]
    fn test_answer_confidence_thresholds() {
        assert_eq!(AnswerConfidence::from_mean_relevance(0.85), AnswerConfidence::High);
        assert_eq!(AnswerConfidence::from_mean_relevance(0.8), AnswerConfidence::Medium);
        assert_eq!(AnswerConfidence::from_mean_relevance(0.6), AnswerConfidence::Low);
        assert_eq!(AnswerConfidence::from_mean_relevance(0.4), AnswerConfidence::Uncertain);
    }

    #[test]
    fn test_faithfulness_confidence_boundaries() {
        assert_eq!(FaithfulnessConfidence::from_score(0.9), FaithfulnessConfidence::High);
        assert_eq!(FaithfulnessConfidence::from_score(0.89), FaithfulnessConfidence::Medium);
        assert_eq!(FaithfulnessConfidence::from_score(0.7), FaithfulnessConfidence::Medium);
        assert_eq!(FaithfulnessConfidence::from_score(0.69), FaithfulnessConfidence::Low);
        assert_eq!(FaithfulnessConfidence::from_score(0.4), FaithfulnessConfidence::Low);
        assert_eq!(
            FaithfulnessConfidence::from_score(0.39),
            FaithfulnessConfidence::Hallucination
        );
    }

    #[test]
    fn test_filters_match_metadata() {
        let metadata = ChunkMetadata {
            document_type: DocumentType::Policy,
            language: "en".to_string(),
            topics: vec!["Water".to_string(), "cooling".to_string()],
            content_hash: String::new(),
        };

        assert!(SearchFilters::new().matches(&metadata));
        assert!(SearchFilters::new()
            .with_topics(vec!["water".to_string()])
            .with_language("EN")
            .matches(&metadata));
        assert!(!SearchFilters::new()
            .with_document_types(vec![DocumentType::Guidance])
            .matches(&metadata));
        assert!(!SearchFilters::new()
            .with_topics(vec!["land".to_string()])
            .matches(&metadata));
    }

    #[test]
    fn test_verified_claim_serializes_flat() {
        let verified = VerifiedClaim {
            claim: Claim::new("The site uses 5 MW.", 0.9),
            supported: true,
            source_ref: Some("chunk-1".to_string()),
        };
        let json = serde_json::to_value(&verified).unwrap();
        assert_eq!(json["statement"], "The site uses 5 MW.");
        assert_eq!(json["supported"], true);
    }
}
