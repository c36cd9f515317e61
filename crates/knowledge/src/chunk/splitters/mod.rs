//! Section splitters.
//!
//! A splitter cuts a document into labelled byte ranges. Ranges are already
//! trimmed of surrounding whitespace so that the text they cover is exactly
//! the chunk content.

mod heading;
mod marker;
mod narrative;

pub use heading::HeadingSplitter;
pub use marker::MarkerSplitter;
pub use narrative::NarrativeSplitter;

use std::ops::Range;

/// Sections shorter than this (in chars, after trimming) are dropped.
pub const MIN_SECTION_CHARS: usize = 100;

/// A labelled region of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Byte range into the source text
    pub range: Range<usize>,
    /// Heading title, marker text, or "Section N"
    pub label: String,
}

/// Trait for section splitters.
pub trait SectionSplitter {
    fn name(&self) -> &'static str;

    /// Split `text` into sections.
    ///
    /// Returns `None` when the structure this splitter looks for is absent,
    /// so the caller can fall back to another splitter.
    fn split(&self, text: &str) -> Option<Vec<Section>>;
}

/// Narrow a byte range to exclude leading and trailing whitespace.
///
/// Returns `None` if nothing but whitespace remains.
pub(crate) fn trimmed_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    let start = range.start + leading;
    let end = range.end - trailing;
    (start < end).then_some(start..end)
}

/// Cut `text` at `boundaries` (sorted byte offsets of marker starts, each
/// paired with its label). Produces a preamble section before the first
/// marker and one section per marker, dropping those under the size floor.
pub(crate) fn sections_between(text: &str, boundaries: &[(usize, String)]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut synthetic = 0usize;

    let first = boundaries.first().map(|(start, _)| *start).unwrap_or(text.len());
    if let Some(range) = trimmed_range(text, 0..first) {
        if text[range.clone()].chars().count() >= MIN_SECTION_CHARS {
            synthetic += 1;
            sections.push(Section {
                range,
                label: format!("Section {}", synthetic),
            });
        }
    }

    for (i, (start, label)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(text.len());

        let Some(range) = trimmed_range(text, *start..end) else {
            continue;
        };
        let len = text[range.clone()].chars().count();
        if len < MIN_SECTION_CHARS {
            tracing::debug!("Dropping short section '{}' ({} chars)", label, len);
            continue;
        }

        sections.push(Section {
            range,
            label: label.clone(),
        });
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_range() {
        let text = "  hello \n";
        assert_eq!(trimmed_range(text, 0..text.len()), Some(2..7));
        assert_eq!(trimmed_range(text, 7..9), None);
    }

    #[test]
    fn test_sections_between_keeps_long_preamble() {
        let preamble = "p".repeat(120);
        let body = "b".repeat(150);
        let text = format!("{}\n\nMARK {}", preamble, body);
        let start = text.find("MARK").unwrap();

        let sections = sections_between(&text, &[(start, "MARK".to_string())]);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].label, "Section 1");
        assert_eq!(&text[sections[0].range.clone()], preamble);
        assert_eq!(sections[1].label, "MARK");
    }

    #[test]
    fn test_sections_between_drops_short_sections() {
        let text = format!("intro\nA short\nB {}", "x".repeat(120));
        let a = text.find("A short").unwrap();
        let b = text.find("B ").unwrap();

        let sections = sections_between(&text, &[(a, "A".to_string()), (b, "B".to_string())]);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].label, "B");
    }
}
