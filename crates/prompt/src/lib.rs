//! Prompt system for askbase.
//!
//! Every model call made by the knowledge pipeline goes through a named
//! prompt definition:
//! - Built-in defaults compiled into the crate
//! - Optional YAML overrides in `.askbase/prompts/<id>.yml`
//! - Handlebars rendering of both the system instruction and the user message

pub mod builder;
pub mod library;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use library::{PromptId, PromptLibrary};
pub use loader::{list_prompts, load_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
