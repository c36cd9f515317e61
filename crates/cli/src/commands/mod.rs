//! Command handlers for the askbase CLI.

pub mod ask;
pub mod chunks;
pub mod ingest;
pub mod verify;

pub use ask::AskCommand;
pub use chunks::ChunksCommand;
pub use ingest::IngestCommand;
pub use verify::{ClaimsCommand, VerifyCommand};

use askbase_core::AppResult;
use askbase_knowledge::{DocumentType, SearchFilters};
use serde::Serialize;

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build search filters from repeated `--topic` / `--type` flags.
pub(crate) fn build_filters(
    topics: &[String],
    types: &[String],
    language: Option<&str>,
) -> AppResult<SearchFilters> {
    let document_types = types
        .iter()
        .map(|t| t.parse::<DocumentType>())
        .collect::<AppResult<Vec<_>>>()?;

    let mut filters = SearchFilters::new()
        .with_topics(topics.to_vec())
        .with_document_types(document_types);
    if let Some(language) = language {
        filters = filters.with_language(language);
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filters() {
        let filters = build_filters(
            &["water".to_string()],
            &["audit-report".to_string()],
            Some("en"),
        )
        .unwrap();
        assert_eq!(filters.document_types, vec![DocumentType::AuditReport]);
        assert_eq!(filters.language.as_deref(), Some("en"));
        assert!(filters.has_filters());

        assert!(build_filters(&[], &["memo".to_string()], None)
            .unwrap_err()
            .is_validation());
    }
}
