//! Recurring-marker splitter ("FINDING 3:", "Step 2:").

use super::{sections_between, Section, SectionSplitter};
use regex::Regex;
use std::sync::OnceLock;

fn finding_regex() -> &'static Regex {
    static FINDING: OnceLock<Regex> = OnceLock::new();
    FINDING.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*FINDING[ \t]+\d+[ \t]*:")
            .expect("finding pattern is valid")
    })
}

fn step_regex() -> &'static Regex {
    static STEP: OnceLock<Regex> = OnceLock::new();
    STEP.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*STEP[ \t]+\d+[ \t]*:")
            .expect("step pattern is valid")
    })
}

/// Splits at each occurrence of a structural marker.
pub struct MarkerSplitter {
    name: &'static str,
    pattern: &'static Regex,
}

impl MarkerSplitter {
    /// Audit report findings: `FINDING <n>:`
    pub fn finding() -> Self {
        Self {
            name: "finding_marker",
            pattern: finding_regex(),
        }
    }

    /// Playbook steps: `Step <n>:`
    pub fn step() -> Self {
        Self {
            name: "step_marker",
            pattern: step_regex(),
        }
    }
}

impl SectionSplitter for MarkerSplitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn split(&self, text: &str) -> Option<Vec<Section>> {
        let boundaries: Vec<(usize, String)> = self
            .pattern
            .find_iter(text)
            .map(|m| {
                let marker = m.as_str().trim();
                let label = marker.trim_end_matches(':').trim_end().to_string();
                // Offset of the marker itself, past any indentation
                let start = m.start() + (m.as_str().len() - m.as_str().trim_start().len());
                (start, label)
            })
            .collect();

        if boundaries.is_empty() {
            return None;
        }

        tracing::debug!("Found {} {} markers", boundaries.len(), self.name);
        Some(sections_between(text, &boundaries))
    }
}
