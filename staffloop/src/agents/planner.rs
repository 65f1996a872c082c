//! Planning service: turns the change request into the initial plan.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::types::{ChangeRequest, RepositoryContext};
use crate::io::completion::CompletionClient;
use crate::io::prompt::PromptBuilder;

/// Produces the initial plan. Called once per run; any error aborts the run.
pub trait Planner {
    fn plan(&self, request: &ChangeRequest, context: &RepositoryContext) -> Result<String>;
}

impl<T: Planner + ?Sized> Planner for &T {
    fn plan(&self, request: &ChangeRequest, context: &RepositoryContext) -> Result<String> {
        (**self).plan(request, context)
    }
}

#[derive(Debug, Clone)]
pub struct PlanningAgent<C> {
    client: C,
    prompts: PromptBuilder,
    max_tokens: u32,
}

impl<C: CompletionClient> PlanningAgent<C> {
    pub fn new(client: C, prompts: PromptBuilder, max_tokens: u32) -> Self {
        Self {
            client,
            prompts,
            max_tokens,
        }
    }
}

impl<C: CompletionClient> Planner for PlanningAgent<C> {
    #[instrument(skip_all, fields(head = %context.head))]
    fn plan(&self, request: &ChangeRequest, context: &RepositoryContext) -> Result<String> {
        let prompt = self
            .prompts
            .planner(request, context)?
            .into_request(self.max_tokens);
        let text = self.client.complete(&prompt).context("planning call failed")?;
        if text.trim().is_empty() {
            bail!("planning call returned an empty plan");
        }
        info!(plan_bytes = text.len(), "plan received");
        Ok(text)
    }
}
