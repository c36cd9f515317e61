//! Built-in prompts used by the knowledge pipeline.
//!
//! A [`PromptLibrary`] starts from the compiled-in defaults and replaces any
//! of them that the workspace overrides in `.askbase/prompts/`.

use crate::builder::build_prompt;
use crate::loader::{list_prompts, load_prompt};
use crate::types::{BuiltPrompt, PromptDefinition, PromptOutputSpec};
use askbase_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Prompts the pipeline knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Answer from numbered context passages.
    AnswerGrounded,
    /// Answer when retrieval found nothing.
    AnswerNoContext,
    /// Suggest related questions as a JSON array.
    AnswerFollowUp,
    /// Extract atomic claims as a JSON array.
    VerifyExtractClaims,
    /// Judge one claim against sources: TRUE, FALSE or UNKNOWN.
    VerifyCheckClaim,
}

impl PromptId {
    pub const ALL: [PromptId; 5] = [
        PromptId::AnswerGrounded,
        PromptId::AnswerNoContext,
        PromptId::AnswerFollowUp,
        PromptId::VerifyExtractClaims,
        PromptId::VerifyCheckClaim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptId::AnswerGrounded => "answer.grounded",
            PromptId::AnswerNoContext => "answer.no_context",
            PromptId::AnswerFollowUp => "answer.follow_up",
            PromptId::VerifyExtractClaims => "verify.extract_claims",
            PromptId::VerifyCheckClaim => "verify.check_claim",
        }
    }
}

const GROUNDED_SYSTEM: &str = "You are a research assistant for a catalog of infrastructure transparency documents.
Answer the user's question using ONLY the numbered context passages below.
Cite every statement with the bracket number of the passage it comes from, for example [1] or [2][3].
If the context does not contain enough information to answer, say so explicitly instead of guessing.

Context:
{{context}}";

const NO_CONTEXT_SYSTEM: &str = "You are a research assistant for a catalog of infrastructure transparency documents.
No documents in the knowledge base matched the user's question.
Say clearly that you do not have information on this topic. Do not invent facts or sources.
Suggest what the user could do instead: rephrase the question, broaden the filters, or consult the original publisher.";

const FOLLOW_UP_TEMPLATE: &str = "A user asked: {{query}}

They received this answer:
{{answer}}

Suggest 2 or 3 related follow-up questions the user might ask next.
Respond with ONLY a JSON array of strings, for example [\"First question?\", \"Second question?\"].";

const EXTRACT_CLAIMS_TEMPLATE: &str = "Extract the atomic factual claims from the answer below.
Each claim must be a single, independently verifiable statement.
Respond with ONLY a JSON array of objects with the fields \"statement\" (string) and \"confidence\" (number between 0 and 1).

Answer:
{{answer}}";

const CHECK_CLAIM_TEMPLATE: &str = "Source passages:
{{sources}}

Claim: {{claim}}

Is the claim fully supported by the source passages?
Reply with exactly one word: TRUE, FALSE, or UNKNOWN.
If TRUE, you may append the bracket number of the supporting passage, for example: TRUE [2]";

fn builtin(id: PromptId) -> PromptDefinition {
    let (title, system, template, format) = match id {
        PromptId::AnswerGrounded => (
            "Grounded answer",
            Some(GROUNDED_SYSTEM),
            "{{query}}",
            "markdown",
        ),
        PromptId::AnswerNoContext => (
            "No-context answer",
            Some(NO_CONTEXT_SYSTEM),
            "{{query}}",
            "markdown",
        ),
        PromptId::AnswerFollowUp => ("Follow-up questions", None, FOLLOW_UP_TEMPLATE, "json"),
        PromptId::VerifyExtractClaims => ("Claim extraction", None, EXTRACT_CLAIMS_TEMPLATE, "json"),
        PromptId::VerifyCheckClaim => ("Claim check", None, CHECK_CLAIM_TEMPLATE, "text"),
    };

    PromptDefinition {
        id: id.as_str().to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        created_by: "askbase".to_string(),
        system: system.map(str::to_string),
        template: template.to_string(),
        output: PromptOutputSpec {
            format: format.to_string(),
        },
    }
}

/// Resolved set of prompt definitions.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    definitions: HashMap<PromptId, PromptDefinition>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLibrary {
    /// Library holding only the compiled-in prompts.
    pub fn builtin() -> Self {
        let definitions = PromptId::ALL
            .iter()
            .map(|id| (*id, builtin(*id)))
            .collect();
        Self { definitions }
    }

    /// Built-in prompts with workspace overrides applied.
    ///
    /// Override files with unknown ids are ignored with a warning; a
    /// malformed override for a known id is an error.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut library = Self::builtin();

        for name in list_prompts(workspace_path)? {
            match PromptId::ALL.iter().find(|id| id.as_str() == name) {
                Some(id) => {
                    let definition = load_prompt(workspace_path, &name)?;
                    library.definitions.insert(*id, definition);
                }
                None => tracing::warn!("Ignoring unknown prompt override: {}", name),
            }
        }

        Ok(library)
    }

    pub fn definition(&self, id: PromptId) -> AppResult<&PromptDefinition> {
        self.definitions
            .get(&id)
            .ok_or_else(|| AppError::Prompt(format!("Prompt not registered: {}", id.as_str())))
    }

    /// Render a prompt with `(name, value)` variables.
    pub fn render(&self, id: PromptId, variables: &[(&str, &str)]) -> AppResult<BuiltPrompt> {
        let vars = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        build_prompt(self.definition(id)?, vars)
    }
}
