//! Ingest command handler.
//!
//! Reads Markdown, HTML and plain-text files (directories are walked) and
//! runs each through chunking, embedding and storage.

use super::print_json;
use askbase_core::{config::AppConfig, AppError, AppResult};
use askbase_knowledge::parser::{infer_title, parse_file, ContentType};
use askbase_knowledge::{DocumentRecord, DocumentType, IngestReport, KnowledgeService};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Chunk, embed and store documents
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Document type (guidance, policy, audit_report, playbook, case_study, dataset)
    #[arg(short = 't', long = "type", default_value = "guidance")]
    pub document_type: String,

    /// Document id (single file only; default: derived from the file name)
    #[arg(long)]
    pub id: Option<String>,

    /// Document title (single file only; default: first heading or file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Canonical URL shown in citations (single file only)
    #[arg(long)]
    pub url: Option<String>,

    /// Document language
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Topic tags (repeatable)
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestFailure {
    path: PathBuf,
    error: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestSummary {
    ingested: Vec<IngestReport>,
    failed: Vec<IngestFailure>,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let document_type: DocumentType = self.document_type.parse()?;
        let files = collect_files(&self.paths)?;

        if files.is_empty() {
            return Err(AppError::Validation(
                "No Markdown, HTML or text files found".to_string(),
            ));
        }
        if files.len() > 1 && (self.id.is_some() || self.title.is_some() || self.url.is_some()) {
            return Err(AppError::Validation(
                "--id, --title and --url apply to a single file only".to_string(),
            ));
        }

        tracing::info!("Ingesting {} files as {}", files.len(), document_type);
        let service = KnowledgeService::open(config)?;
        let mut summary = IngestSummary::default();

        for path in &files {
            match self.ingest_file(&service, path, document_type).await {
                Ok(report) => summary.ingested.push(report),
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {}", path, e);
                    summary.failed.push(IngestFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.json {
            print_json(&summary)?;
        } else {
            for report in &summary.ingested {
                println!(
                    "{}: {} chunks ({} embedded)",
                    report.document_id, report.chunks_stored, report.chunks_embedded
                );
            }
            for failure in &summary.failed {
                println!("{}: failed: {}", failure.path.display(), failure.error);
            }
            println!(
                "Ingested {} of {} files",
                summary.ingested.len(),
                files.len()
            );
        }

        if summary.ingested.is_empty() {
            return Err(AppError::Knowledge("No file could be ingested".to_string()));
        }
        Ok(())
    }

    async fn ingest_file(
        &self,
        service: &KnowledgeService,
        path: &Path,
        document_type: DocumentType,
    ) -> AppResult<IngestReport> {
        let text = parse_file(path)?;
        let record = DocumentRecord {
            id: self.id.clone().unwrap_or_else(|| document_id_for(path)),
            title: self
                .title
                .clone()
                .unwrap_or_else(|| infer_title(path, &text)),
            url: self.url.clone(),
            document_type,
            language: self.language.clone(),
            topics: self.topics.clone(),
        };

        service.ingest_document(&record, &text).await
    }
}

/// Supported files under `paths`, sorted for a stable ingestion order.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.exists() {
            return Err(AppError::Validation(format!(
                "Path does not exist: {:?}",
                path
            )));
        }

        if path.is_file() {
            files.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            if entry_path.is_file() && ContentType::from_path(entry_path).is_supported() {
                files.push(entry_path.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Lowercase file stem with runs of other characters collapsed to `-`.
fn document_id_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let mut id = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_alphanumeric() {
            id.extend(ch.to_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }

    let id = id.trim_matches('-');
    if id.is_empty() {
        "document".to_string()
    } else {
        id.to_string()
    }
}
