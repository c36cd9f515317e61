//! Knowledge pipeline configuration.
//!
//! Loaded from `.askbase/knowledge/config.yaml`; every field has a default so
//! the file is optional and may be partial.

use crate::chunk::{StrategyTable, TypeStrategy};
use crate::embeddings::EmbeddingConfig;
use crate::rag::FusionWeights;
use crate::types::DocumentType;
use askbase_core::config::STATE_DIR;
use askbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub vector_weight: f32,
    pub text_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let weights = FusionWeights::default();
        Self {
            top_k: 5,
            vector_weight: weights.vector,
            text_weight: weights.text,
        }
    }
}

impl RetrievalConfig {
    pub fn weights(&self) -> FusionWeights {
        FusionWeights {
            vector: self.vector_weight,
            text: self.text_weight,
        }
    }
}

/// Answer generation settings.
///
/// Models left unset fall back to the application's configured model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heavy_model: Option<String>,
    pub follow_up_questions: bool,
    pub history_turns: usize,
    /// Attach a faithfulness check to every chat answer
    pub verify_answers: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fast_model: None,
            heavy_model: None,
            follow_up_questions: true,
            history_turns: 6,
            verify_answers: false,
        }
    }
}

/// Full knowledge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    /// Per document type overrides of the chunking strategy table
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub chunking: BTreeMap<DocumentType, TypeStrategy>,
    /// SQLite store location, relative to the workspace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl KnowledgeConfig {
    /// The default strategy table with configured overrides applied.
    pub fn strategy_table(&self) -> StrategyTable {
        StrategyTable::with_overrides(&self.chunking)
    }

    /// Resolved store location.
    pub fn store_path(&self, workspace: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => workspace.join(path),
            None => get_index_path(workspace),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(AppError::Config(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        for (doc_type, strategy) in &self.chunking {
            if strategy.min_tokens == 0 || strategy.min_tokens > strategy.max_tokens {
                return Err(AppError::Config(format!(
                    "chunking.{}: min_tokens must be between 1 and max_tokens",
                    doc_type
                )));
            }
        }
        Ok(())
    }
}

/// Load the knowledge configuration, or defaults when no file exists.
pub fn load_config(workspace: &Path) -> AppResult<KnowledgeConfig> {
    let config_path = get_config_path(workspace);

    if !config_path.exists() {
        tracing::debug!("No knowledge config at {:?}, using defaults", config_path);
        return Ok(KnowledgeConfig::default());
    }

    let content = fs::read_to_string(&config_path).map_err(|e| {
        AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
    })?;
    let config: KnowledgeConfig = serde_yaml::from_str(&content).map_err(|e| {
        AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
    })?;
    config.validate()?;

    tracing::debug!("Loaded knowledge config from {:?}", config_path);
    Ok(config)
}

pub fn save_config(workspace: &Path, config: &KnowledgeConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved knowledge config to {:?}", config_path);
    Ok(())
}

pub fn get_knowledge_dir(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("knowledge")
}

pub fn get_config_path(workspace: &Path) -> PathBuf {
    get_knowledge_dir(workspace).join("config.yaml")
}

/// Default SQLite store location.
pub fn get_index_path(workspace: &Path) -> PathBuf {
    get_knowledge_dir(workspace).join("index.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SplitStrategy;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config, KnowledgeConfig::default());
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.generation.history_turns, 6);
        assert_eq!(
            config.store_path(temp.path()),
            temp.path().join(".askbase/knowledge/index.sqlite")
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "retrieval:\n  top_k: 8\ngeneration:\n  verify_answers: true\n\
             chunking:\n  dataset:\n    min_tokens: 25\n    max_tokens: 400\n    strategy: narrative\n",
        )
        .unwrap();

        let config = load_config(temp.path()).unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.vector_weight, 0.7);
        assert!(config.generation.verify_answers);
        assert!(config.generation.follow_up_questions);

        let table = config.strategy_table();
        let dataset = table.get(DocumentType::Dataset).unwrap();
        assert_eq!(dataset.strategy, SplitStrategy::Narrative);
        assert_eq!(dataset.max_chars(), 1600);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut config = KnowledgeConfig::default();
        config.generation.fast_model = Some("llama3.2".to_string());
        config.store_path = Some(PathBuf::from("data/chunks.sqlite"));

        save_config(temp.path(), &config).unwrap();
        let loaded = load_config(temp.path()).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(
            loaded.store_path(temp.path()),
            temp.path().join("data/chunks.sqlite")
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "retrieval:\n  top_k: 0\n").unwrap();

        assert!(matches!(
            load_config(temp.path()),
            Err(AppError::Config(_))
        ));
    }
}
