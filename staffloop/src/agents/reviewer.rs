//! Review service: judges the applied diff and returns a structured verdict.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::plan::Plan;
use crate::core::types::{ChangeRequest, Verdict};
use crate::core::verdict::extract_verdict;
use crate::io::completion::CompletionClient;
use crate::io::prompt::PromptBuilder;

/// Everything the reviewer sees for one iteration.
#[derive(Debug, Clone, Copy)]
pub struct ReviewInput<'a> {
    pub request: &'a ChangeRequest,
    pub plan: &'a Plan,
    pub changed_files: &'a [String],
    pub diff: &'a str,
}

/// Parsed review. A reply that could not be parsed still yields a NONPASS verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub verdict: Verdict,
    pub parse_error: Option<String>,
    pub raw: String,
}

impl Review {
    pub fn parse_failed(&self) -> bool {
        self.parse_error.is_some()
    }
}

/// Reviews the current diff. `Err` means the call itself failed.
pub trait Reviewer {
    fn review(&self, input: &ReviewInput<'_>) -> Result<Review>;
}

impl<T: Reviewer + ?Sized> Reviewer for &T {
    fn review(&self, input: &ReviewInput<'_>) -> Result<Review> {
        (**self).review(input)
    }
}

#[derive(Debug, Clone)]
pub struct ReviewAgent<C> {
    client: C,
    prompts: PromptBuilder,
    max_tokens: u32,
}

impl<C: CompletionClient> ReviewAgent<C> {
    pub fn new(client: C, prompts: PromptBuilder, max_tokens: u32) -> Self {
        Self {
            client,
            prompts,
            max_tokens,
        }
    }
}

impl<C: CompletionClient> Reviewer for ReviewAgent<C> {
    #[instrument(skip_all, fields(files = input.changed_files.len(), diff_bytes = input.diff.len()))]
    fn review(&self, input: &ReviewInput<'_>) -> Result<Review> {
        let prompt = self
            .prompts
            .reviewer(input.request, input.plan, input.changed_files, input.diff)?
            .into_request(self.max_tokens);
        let raw = self.client.complete(&prompt)?;
        let parsed = extract_verdict(&raw);
        if let Some(err) = &parsed.parse_error {
            warn!(error = %err, "reviewer output could not be parsed");
        } else {
            info!(verdict = %parsed.verdict.outcome, "review received");
        }
        Ok(Review {
            verdict: parsed.verdict,
            parse_error: parsed.parse_error,
            raw,
        })
    }
}
