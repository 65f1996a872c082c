//! Generation service: asks for a unified diff implementing the plan.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::diff::{is_unified_diff, normalize_diff};
use crate::core::plan::Plan;
use crate::core::types::ChangeRequest;
use crate::io::completion::CompletionClient;
use crate::io::prompt::PromptBuilder;

/// What a generation call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Output that starts with a diff header, normalized for `git apply`.
    Diff(String),
    /// Anything else (prose, fenced code), kept verbatim for the artifacts.
    NotADiff(String),
}

impl Generation {
    /// Classify raw endpoint output.
    pub fn classify(raw: String) -> Self {
        if is_unified_diff(&raw) {
            Generation::Diff(normalize_diff(&raw))
        } else {
            Generation::NotADiff(raw)
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Generation::Diff(text) | Generation::NotADiff(text) => text,
        }
    }
}

/// Produces a candidate diff. `Err` means the call itself failed.
pub trait Generator {
    fn generate(&self, plan: &Plan, request: &ChangeRequest) -> Result<Generation>;
}

impl<T: Generator + ?Sized> Generator for &T {
    fn generate(&self, plan: &Plan, request: &ChangeRequest) -> Result<Generation> {
        (**self).generate(plan, request)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationAgent<C> {
    client: C,
    prompts: PromptBuilder,
    max_tokens: u32,
}

impl<C: CompletionClient> GenerationAgent<C> {
    pub fn new(client: C, prompts: PromptBuilder, max_tokens: u32) -> Self {
        Self {
            client,
            prompts,
            max_tokens,
        }
    }
}

impl<C: CompletionClient> Generator for GenerationAgent<C> {
    #[instrument(skip_all, fields(plan_bytes = plan.len()))]
    fn generate(&self, plan: &Plan, request: &ChangeRequest) -> Result<Generation> {
        let prompt = self
            .prompts
            .generator(plan, request)?
            .into_request(self.max_tokens);
        let raw = self.client.complete(&prompt)?;
        let generation = Generation::classify(raw);
        match &generation {
            Generation::Diff(diff) => debug!(diff_bytes = diff.len(), "generation returned a diff"),
            Generation::NotADiff(text) => {
                warn!(output_bytes = text.len(), "generation did not return a diff");
            }
        }
        Ok(generation)
    }
}
