//! Source file reading and text extraction for ingestion.
//!
//! Markdown and plain text are passed through untouched so heading and
//! marker detection see the original structure. HTML is reduced to text with
//! paragraph breaks kept and `<h1>`-`<h3>` turned into markdown headings.

use askbase_core::{AppError, AppResult};
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }

    /// Whether directory ingestion should pick up files of this type.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Read a source file and extract its text.
pub fn parse_file(path: &Path) -> AppResult<String> {
    let content_type = ContentType::from_path(path);

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    match content_type {
        ContentType::Html => Ok(html_to_text(&raw)),
        ContentType::Markdown | ContentType::PlainText => Ok(raw),
        ContentType::Unknown => {
            if raw.contains('\0') {
                tracing::warn!("Skipping likely binary file: {:?}", path);
                return Err(AppError::Validation(format!(
                    "Binary file not supported: {:?}",
                    path
                )));
            }
            Ok(raw)
        }
    }
}

/// Title for a document: its first markdown heading, else the file stem.
pub fn infer_title(path: &Path, text: &str) -> String {
    let heading = text
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|title| !title.is_empty());

    heading.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string()
    })
}

struct HtmlPatterns {
    hidden: Regex,
    heading: Regex,
    block: Regex,
    tag: Regex,
    blank_lines: Regex,
}

fn html_patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| HtmlPatterns {
        hidden: Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
            .expect("hidden element pattern is valid"),
        heading: Regex::new(r"(?is)<h([1-3])\b[^>]*>(.*?)</h[1-3]\s*>")
            .expect("heading pattern is valid"),
        block: Regex::new(
            r"(?i)</?(?:p|div|br|li|ul|ol|tr|table|section|article|blockquote|h[4-6])\b[^>]*>",
        )
        .expect("block pattern is valid"),
        tag: Regex::new(r"<[^>]*>").expect("tag pattern is valid"),
        blank_lines: Regex::new(r"\n{3,}").expect("blank line pattern is valid"),
    })
}

/// Strip HTML down to text, keeping paragraph breaks.
pub fn html_to_text(html: &str) -> String {
    let p = html_patterns();

    let text = p.hidden.replace_all(html, "");
    let text = p.heading.replace_all(&text, |caps: &Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        let title = p.tag.replace_all(&caps[2], "");
        format!(
            "\n\n{} {}\n\n",
            "#".repeat(level),
            collapse_whitespace(&title)
        )
    });
    let text = p.block.replace_all(&text, "\n\n");
    let text = p.tag.replace_all(&text, "");
    let text = decode_entities(&text);

    let lines: Vec<String> = text.lines().map(collapse_whitespace).collect();
    p.blank_lines
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("report.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("page.HTML")),
            ContentType::Html
        );
        assert_eq!(
            ContentType::from_path(Path::new("notes.txt")),
            ContentType::PlainText
        );
        assert!(!ContentType::from_path(Path::new("image.png")).is_supported());
    }

    #[test]
    fn test_html_keeps_paragraphs_and_headings() {
        let html = "<html><head><style>p { color: red; }</style></head><body>\
            <h2 class=\"x\">Water <b>use</b></h2><p>Hello <b>world</b> &amp; friends.</p>\
            <p>Second   paragraph.</p><script>alert(1)</script></body></html>";
        let text = html_to_text(html);
        assert_eq!(
            text,
            "## Water use\n\nHello world & friends.\n\nSecond paragraph."
        );
    }

    #[test]
    fn test_markdown_passes_through() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("guide.md");
        let content = "# Guide\n\n## Section\n\nBody text.";
        fs::write(&path, content).unwrap();

        assert_eq!(parse_file(&path).unwrap(), content);
    }

    #[test]
    fn test_binary_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob.bin");
        fs::write(&path, "abc\0def").unwrap();

        assert!(parse_file(&path).unwrap_err().is_validation());
    }

    #[test]
    fn test_infer_title() {
        assert_eq!(
            infer_title(Path::new("a/b/cooling.md"), "Intro\n\n# Cooling Guide\n"),
            "Cooling Guide"
        );
        assert_eq!(infer_title(Path::new("a/b/cooling.txt"), "No heading"), "cooling");
    }
}
