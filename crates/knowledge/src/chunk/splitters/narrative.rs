//! Paragraph-accumulation splitter for narrative documents.

use super::{trimmed_range, Section, SectionSplitter, MIN_SECTION_CHARS};
use crate::chunk::strategy::estimate_tokens;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Paragraphs at or below this many chars are not chunk material.
const MIN_PARAGRAPH_CHARS: usize = 50;

fn blank_line_regex() -> &'static Regex {
    static BLANK_LINE: OnceLock<Regex> = OnceLock::new();
    BLANK_LINE.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("blank line pattern is valid"))
}

/// Greedily packs paragraphs into chunks up to a token budget.
///
/// A chunk's range covers everything from its first to its last packed
/// paragraph, so short paragraphs sitting between two packed ones remain
/// part of the text.
pub struct NarrativeSplitter {
    max_tokens: usize,
}

impl NarrativeSplitter {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    fn paragraphs(text: &str) -> Vec<Range<usize>> {
        let mut paragraphs = Vec::new();
        let mut start = 0;

        for separator in blank_line_regex().find_iter(text) {
            if let Some(range) = trimmed_range(text, start..separator.start()) {
                paragraphs.push(range);
            }
            start = separator.end();
        }
        if let Some(range) = trimmed_range(text, start..text.len()) {
            paragraphs.push(range);
        }

        paragraphs
            .into_iter()
            .filter(|range| text[range.clone()].chars().count() > MIN_PARAGRAPH_CHARS)
            .collect()
    }
}

impl SectionSplitter for NarrativeSplitter {
    fn name(&self) -> &'static str {
        "narrative"
    }

    fn split(&self, text: &str) -> Option<Vec<Section>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        let mut running: Option<Range<usize>> = None;

        for paragraph in Self::paragraphs(text) {
            running = Some(match running {
                None => paragraph,
                Some(current) => {
                    if estimate_tokens(&text[current.start..paragraph.end]) > self.max_tokens {
                        ranges.push(current);
                        paragraph
                    } else {
                        current.start..paragraph.end
                    }
                }
            });
        }

        if let Some(last) = running {
            if text[last.clone()].chars().count() > MIN_SECTION_CHARS {
                ranges.push(last);
            }
        }

        let sections = ranges
            .into_iter()
            .enumerate()
            .map(|(i, range)| Section {
                range,
                label: format!("Section {}", i + 1),
            })
            .collect();

        Some(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(word: &str, repeat: usize) -> String {
        format!("{} ", word).repeat(repeat).trim_end().to_string()
    }

    #[test]
    fn test_short_paragraphs_are_dropped() {
        let text = format!("Too short.\n\n{}", paragraph("narrative", 15));
        let sections = NarrativeSplitter::new(600).split(&text).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(text[sections[0].range.clone()].starts_with("narrative"));
    }

    #[test]
    fn test_accumulates_until_budget() {
        // Each paragraph is 199 chars (50 tokens)
        let p = paragraph("abcdefghi", 20);
        let text = [p.as_str(); 5].join("\n\n");

        let sections = NarrativeSplitter::new(120).split(&text).unwrap();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].label, "Section 1");
        assert_eq!(sections[2].label, "Section 3");
        for section in &sections {
            assert!(estimate_tokens(&text[section.range.clone()]) <= 120);
        }
    }

    #[test]
    fn test_trailing_chunk_needs_minimum_length() {
        let text = format!("{}\n\n{}", paragraph("first", 40), "x".repeat(60));
        // Budget forces the 60-char paragraph into its own trailing chunk
        let sections = NarrativeSplitter::new(60).split(&text).unwrap();
        assert_eq!(sections.len(), 1);
    }

    #[test]
    fn test_crlf_blank_lines() {
        let p = paragraph("windows", 14);
        let text = format!("{}\r\n\r\n{}", p, p);
        let sections = NarrativeSplitter::new(30).split(&text).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(&text[sections[1].range.clone()], p);
    }
}
