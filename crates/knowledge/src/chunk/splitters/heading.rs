//! Markdown heading splitter.

use super::{sections_between, Section, SectionSplitter};
use regex::Regex;
use std::sync::OnceLock;

fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(r"(?m)^(#{1,3})[ \t]+(.+?)[ \t#]*$").expect("heading pattern is valid")
    })
}

/// Splits at `#`, `##` and `###` headings. Each section runs to the next heading.
pub struct HeadingSplitter;

impl SectionSplitter for HeadingSplitter {
    fn name(&self) -> &'static str {
        "heading"
    }

    fn split(&self, text: &str) -> Option<Vec<Section>> {
        let boundaries: Vec<(usize, String)> = heading_regex()
            .captures_iter(text)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let title = caps.get(2)?.as_str().trim().to_string();
                Some((start, title))
            })
            .filter(|(_, title)| !title.is_empty())
            .collect();

        if boundaries.is_empty() {
            return None;
        }

        tracing::debug!("Found {} headings", boundaries.len());
        Some(sections_between(text, &boundaries))
    }
}
