//! LLM provider implementations.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use askbase_core::AppError;

/// Classify a transport failure. Refused connections and timeouts mean the
/// provider is unreachable; anything else is a provider error.
pub(crate) fn send_error(provider: &str, err: reqwest::Error) -> AppError {
    if err.is_connect() || err.is_timeout() {
        AppError::Unavailable(format!("{} is unreachable: {}", provider, err))
    } else {
        AppError::Llm(format!("Failed to send request to {}: {}", provider, err))
    }
}
