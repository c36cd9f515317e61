//! Per-document-type chunking strategy table.

use crate::types::{ChunkSchema, DocumentType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed approximation used to turn token budgets into char bounds.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of a text (chars / 4, rounded up so a chunk within
/// the token budget never exceeds the `max_tokens * 4` char bound).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// How a document is cut into sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Markdown headings, levels 1 to 3
    Heading,
    /// "FINDING <n>:" markers
    FindingMarker,
    /// "Step <n>:" markers
    StepMarker,
    /// Blank-line paragraphs accumulated up to the token budget
    Narrative,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::Heading => "heading",
            SplitStrategy::FindingMarker => "finding_marker",
            SplitStrategy::StepMarker => "step_marker",
            SplitStrategy::Narrative => "narrative",
        }
    }
}

/// Token budget and splitting strategy for one document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStrategy {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub strategy: SplitStrategy,
}

impl TypeStrategy {
    pub const fn new(min_tokens: usize, max_tokens: usize, strategy: SplitStrategy) -> Self {
        Self {
            min_tokens,
            max_tokens,
            strategy,
        }
    }

    pub fn min_chars(&self) -> usize {
        self.min_tokens * CHARS_PER_TOKEN
    }

    pub fn max_chars(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    /// Chunk schema derived from this budget.
    pub fn schema(&self, dimensions: Option<usize>) -> ChunkSchema {
        ChunkSchema {
            min_chars: self.min_chars(),
            max_chars: self.max_chars(),
            dimensions,
        }
    }
}

/// Maps document types to their strategy. Types without an entry cannot be chunked.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTable {
    entries: BTreeMap<DocumentType, TypeStrategy>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        let entries = [
            (
                DocumentType::Guidance,
                TypeStrategy::new(50, 800, SplitStrategy::Heading),
            ),
            (
                DocumentType::Policy,
                TypeStrategy::new(50, 1000, SplitStrategy::Heading),
            ),
            (
                DocumentType::AuditReport,
                TypeStrategy::new(25, 1000, SplitStrategy::FindingMarker),
            ),
            (
                DocumentType::Playbook,
                TypeStrategy::new(25, 600, SplitStrategy::StepMarker),
            ),
            (
                DocumentType::CaseStudy,
                TypeStrategy::new(50, 600, SplitStrategy::Narrative),
            ),
        ]
        .into_iter()
        .collect();

        Self { entries }
    }
}

impl StrategyTable {
    /// Default table with `overrides` replacing or adding entries.
    pub fn with_overrides(overrides: &BTreeMap<DocumentType, TypeStrategy>) -> Self {
        let mut table = Self::default();
        for (doc_type, strategy) in overrides {
            tracing::debug!(
                "Chunking override for {}: {} ({}-{} tokens)",
                doc_type,
                strategy.strategy.as_str(),
                strategy.min_tokens,
                strategy.max_tokens
            );
            table.entries.insert(*doc_type, *strategy);
        }
        table
    }

    pub fn get(&self, document_type: DocumentType) -> Option<&TypeStrategy> {
        self.entries.get(&document_type)
    }

    /// Union of all configured char bounds, used where the document type is unknown.
    pub fn widest_schema(&self, dimensions: Option<usize>) -> ChunkSchema {
        let min_chars = self
            .entries
            .values()
            .map(TypeStrategy::min_chars)
            .min()
            .unwrap_or(0);
        let max_chars = self
            .entries
            .values()
            .map(TypeStrategy::max_chars)
            .max()
            .unwrap_or(usize::MAX);
        ChunkSchema {
            min_chars,
            max_chars,
            dimensions,
        }
    }
}
