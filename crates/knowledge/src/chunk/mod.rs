//! Document chunking.
//!
//! The [`Chunker`] picks a splitter from the document type's entry in the
//! [`StrategyTable`], falls back to paragraph accumulation when the document
//! lacks the expected structure, and validates every draft against the
//! type's [`ChunkSchema`](crate::types::ChunkSchema). Invalid drafts are
//! dropped, not reported as errors.

pub mod splitters;
pub mod strategy;

pub use strategy::{estimate_tokens, SplitStrategy, StrategyTable, TypeStrategy};

use crate::types::{Chunk, ChunkDraft, DocumentType};
use askbase_core::{AppError, AppResult};
use splitters::{HeadingSplitter, MarkerSplitter, NarrativeSplitter, Section, SectionSplitter};

/// Documents shorter than this (trimmed) are rejected.
pub const MIN_DOCUMENT_CHARS: usize = 100;

const FORM_FEED: char = '\x0c';

/// Splits raw documents into validated chunks.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    table: StrategyTable,
}

impl Chunker {
    pub fn new(table: StrategyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    /// Chunk a document.
    ///
    /// Chunks come back in document order with contiguous positions starting
    /// at 0 and without ids or embeddings.
    pub fn chunk(
        &self,
        document_id: &str,
        raw_text: &str,
        document_type: DocumentType,
        language: &str,
        topics: &[String],
    ) -> AppResult<Vec<Chunk>> {
        let trimmed_len = raw_text.trim().chars().count();
        if trimmed_len < MIN_DOCUMENT_CHARS {
            return Err(AppError::Validation(format!(
                "Document '{}' is too short to chunk: {} chars, need at least {}",
                document_id, trimmed_len, MIN_DOCUMENT_CHARS
            )));
        }

        let strategy = self.table.get(document_type).ok_or_else(|| {
            AppError::Validation(format!(
                "No chunking strategy configured for document type '{}'",
                document_type
            ))
        })?;

        let sections = split_sections(raw_text, strategy);
        let schema = strategy.schema(None);
        let paginated = raw_text.contains(FORM_FEED);

        let mut chunks = Vec::with_capacity(sections.len());
        let mut dropped = 0usize;

        for section in sections {
            let char_start = char_offset(raw_text, section.range.start);
            let char_end = char_start + raw_text[section.range.clone()].chars().count();
            let page_number = paginated.then(|| page_at(raw_text, section.range.start));

            let draft = ChunkDraft {
                document_id: document_id.to_string(),
                position: chunks.len() as u32,
                content: raw_text[section.range].to_string(),
                source_section: section.label,
                page_number,
                char_start,
                char_end,
                document_type,
                language: language.to_string(),
                topics: topics.to_vec(),
            };

            match Chunk::from_draft(draft, &schema) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => {
                    dropped += 1;
                    tracing::warn!("Dropping invalid chunk of '{}': {}", document_id, e);
                }
            }
        }

        tracing::info!(
            "Chunked '{}' ({}) into {} chunks using {} strategy ({} dropped)",
            document_id,
            document_type,
            chunks.len(),
            strategy.strategy.as_str(),
            dropped
        );

        Ok(chunks)
    }
}

/// Run the type's splitter, falling back to paragraphs when it finds no structure.
fn split_sections(text: &str, strategy: &TypeStrategy) -> Vec<Section> {
    let narrative = NarrativeSplitter::new(strategy.max_tokens);

    let structured: Option<Box<dyn SectionSplitter>> = match strategy.strategy {
        SplitStrategy::Heading => Some(Box::new(HeadingSplitter)),
        SplitStrategy::FindingMarker => Some(Box::new(MarkerSplitter::finding())),
        SplitStrategy::StepMarker => Some(Box::new(MarkerSplitter::step())),
        SplitStrategy::Narrative => None,
    };

    if let Some(splitter) = structured {
        if let Some(sections) = splitter.split(text) {
            return sections;
        }
        tracing::debug!(
            "No {} structure found, falling back to {}",
            splitter.name(),
            narrative.name()
        );
    }

    narrative.split(text).unwrap_or_default()
}

/// Char offset of a byte offset.
fn char_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

/// 1-based page of a byte offset, counting form feeds before it.
fn page_at(text: &str, byte_offset: usize) -> u32 {
    text[..byte_offset].matches(FORM_FEED).count() as u32 + 1
}
