//! Embedding generation for chunks and queries.

pub mod config;
mod embedder;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use embedder::Embedder;
pub use provider::{create_provider, EmbeddingProvider};
