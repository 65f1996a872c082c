//! Prompt builder for the planner, generator, and reviewer calls.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::{debug, warn};

use crate::core::plan::Plan;
use crate::core::types::{ChangeRequest, RepositoryContext};
use crate::io::completion::CompletionRequest;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");

pub const PLANNER_SYSTEM: &str = "You are a senior software planner. \
Write a concrete implementation plan in Markdown with steps and acceptance criteria. \
Be concise and actionable.";

pub const REVIEWER_SYSTEM: &str = "You are a strict reviewer. \
Return ONLY JSON with fields: verdict (PASS or NONPASS), reasons (array of strings), \
and if NONPASS, required_changes (array of specific actionable items).";

/// Droppable sections, least important first.
const DROP_ORDER: [&str; 1] = ["context"];

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should be valid")
});

/// Template engine wrapper around minijinja.
#[derive(Debug, Clone)]
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .context("load planner template")?;
        env.add_template("generator", GENERATOR_TEMPLATE)
            .context("load generator template")?;
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .context("load reviewer template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections, least important first, until under budget.
///
/// Required sections are never cut. A prompt that is still over budget goes
/// out whole and the endpoint decides whether it fits.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total > budget {
        warn!(
            budget,
            total,
            "required prompt sections exceed the budget; sending them in full"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A rendered prompt ready to send to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPack {
    pub system: Option<&'static str>,
    pub content: String,
}

impl PromptPack {
    pub fn into_request(self, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            system: self.system.map(str::to_string),
            prompt: self.content,
            max_tokens,
        }
    }
}

/// Builds prompts within a byte budget by dropping optional sections.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    engine: PromptEngine,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        Ok(Self {
            budget_bytes,
            engine: PromptEngine::new()?,
        })
    }

    fn finish(&self, system: Option<&'static str>, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget(&mut sections, self.budget_bytes);
        PromptPack {
            system,
            content: render_sections(&sections),
        }
    }

    pub fn planner(
        &self,
        request: &ChangeRequest,
        repo: &RepositoryContext,
    ) -> Result<PromptPack> {
        let rendered = self.engine.render(
            "planner",
            context! {
                context => repo.summary().trim(),
                request => request.as_str().trim(),
            },
        )?;
        Ok(self.finish(Some(PLANNER_SYSTEM), &rendered))
    }

    pub fn generator(&self, plan: &Plan, request: &ChangeRequest) -> Result<PromptPack> {
        let rendered = self.engine.render(
            "generator",
            context! {
                plan => plan.as_str().trim(),
                request => request.as_str().trim(),
            },
        )?;
        Ok(self.finish(None, &rendered))
    }

    pub fn reviewer(
        &self,
        request: &ChangeRequest,
        plan: &Plan,
        changed_files: &[String],
        diff: &str,
    ) -> Result<PromptPack> {
        let rendered = self.engine.render(
            "reviewer",
            context! {
                request => request.as_str().trim(),
                plan => plan.as_str().trim(),
                changed_files => changed_files,
                diff => diff.trim_end(),
            },
        )?;
        Ok(self.finish(Some(REVIEWER_SYSTEM), &rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChangeRequest {
        ChangeRequest::new("Add a /health endpoint").expect("request")
    }

    fn repo() -> RepositoryContext {
        RepositoryContext {
            head: "abc1234".to_string(),
            status: vec![" M src/main.rs".to_string()],
        }
    }

    #[test]
    fn planner_prompt_has_context_then_request() {
        let pack = PromptBuilder::new(10_000)
            .expect("builder")
            .planner(&request(), &repo())
            .expect("render");
        assert_eq!(pack.system, Some(PLANNER_SYSTEM));
        let context_pos = pack.content.find("Repo HEAD: abc1234").expect("context");
        let request_pos = pack.content.find("Add a /health endpoint").expect("request");
        assert!(context_pos < request_pos);
        assert!(!pack.content.contains("section:"), "markers are stripped");
    }

    #[test]
    fn generator_prompt_demands_a_unified_diff() {
        let plan = Plan::new("1. add route");
        let pack = PromptBuilder::new(10_000)
            .expect("builder")
            .generator(&plan, &request())
            .expect("render");
        assert_eq!(pack.system, None);
        assert!(pack.content.contains("Return ONLY a unified diff"));
        assert!(pack.content.contains("git apply"));
        assert!(pack.content.contains("1. add route"));
    }

    #[test]
    fn reviewer_prompt_lists_files_and_diff_verbatim() {
        let diff = "diff --git a/src/<x>.rs b/src/<x>.rs\n+fn a() -> Vec<u8> {}\n";
        let files = vec!["src/<x>.rs".to_string(), "README.md".to_string()];
        let pack = PromptBuilder::new(10_000)
            .expect("builder")
            .reviewer(&request(), &Plan::new("plan"), &files, diff)
            .expect("render");
        assert!(pack.content.contains("- src/<x>.rs\n- README.md"));
        assert!(pack.content.contains("+fn a() -> Vec<u8> {}"));
        assert!(pack.content.ends_with("</diff>"));
    }

    #[test]
    fn reviewer_prompt_without_files_says_none() {
        let pack = PromptBuilder::new(10_000)
            .expect("builder")
            .reviewer(&request(), &Plan::new("plan"), &[], "")
            .expect("render");
        assert!(pack.content.contains("(none)"));
    }

    #[test]
    fn budget_drops_context_section() {
        let repo = RepositoryContext {
            head: "abc1234".to_string(),
            status: vec!["?? noise".repeat(100)],
        };
        let pack = PromptBuilder::new(200)
            .expect("builder")
            .planner(&request(), &repo)
            .expect("render");
        assert!(!pack.content.contains("Repo HEAD"));
        assert!(pack.content.contains("Add a /health endpoint"));
    }

    #[test]
    fn oversized_diff_is_sent_in_full() {
        let diff = format!("diff --git a/a b/a\n{}\n+LAST_LINE", "é".repeat(5_000));
        let pack = PromptBuilder::new(1_000)
            .expect("builder")
            .reviewer(&request(), &Plan::new("plan"), &[], &diff)
            .expect("render");
        assert!(pack.content.contains("+LAST_LINE"));
        assert!(pack.content.ends_with("</diff>"));
    }

    #[test]
    fn over_budget_plan_keeps_newest_feedback() {
        let mut plan = Plan::new("x".repeat(2_000));
        assert!(plan.append_feedback(1, &["MUST_HANDLE_HEAD_REQUESTS".to_string()]));
        let pack = PromptBuilder::new(2_000)
            .expect("builder")
            .generator(&plan, &request())
            .expect("render");
        assert!(pack.content.contains("MUST_HANDLE_HEAD_REQUESTS"));
        assert!(pack.content.contains(plan.as_str().trim()));
        assert!(!pack.content.contains("[truncated]"));
    }

    #[test]
    fn into_request_carries_system_and_tokens() {
        let req = PromptPack {
            system: Some("sys"),
            content: "body".to_string(),
        }
        .into_request(42);
        assert_eq!(req.system.as_deref(), Some("sys"));
        assert_eq!(req.prompt, "body");
        assert_eq!(req.max_tokens, 42);
    }
}
