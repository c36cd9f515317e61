//! LLM integration crate for askbase.
//!
//! This crate provides a provider-agnostic abstraction for chat-style
//! completions. Providers implement [`LlmClient`]; callers build an
//! [`LlmRequest`] from a system instruction, optional conversation history,
//! and the current user message.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **OpenAI**: Chat completions API, or any compatible endpoint
//!
//! # Example
//! ```no_run
//! use askbase_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{ChatMessage, LlmClient, LlmRequest, LlmResponse, LlmUsage, Role};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::{ModelTier, ProviderType};
