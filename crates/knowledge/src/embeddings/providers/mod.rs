//! Embedding provider implementations.

mod mock;
mod ollama;

pub use mock::MockProvider;
pub use ollama::OllamaProvider;
