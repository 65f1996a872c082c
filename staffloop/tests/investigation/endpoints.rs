//! Live checks for the Anthropic and OpenAI backends.
//!
//! # Prerequisites
//!
//! - `ANTHROPIC_API_KEY` and/or `OPENAI_API_KEY` exported.
//!
//! ```bash
//! cargo test -p staffloop --test investigation anthropic_reviewer -- --ignored
//! ```

use std::path::Path;

use staffloop::agents::{
    Generation, GenerationAgent, Generator, ReviewAgent, ReviewInput, Reviewer,
};
use staffloop::core::plan::Plan;
use staffloop::core::types::ChangeRequest;
use staffloop::io::completion::{CompletionClient, CompletionRequest, build_client};
use staffloop::io::config::LoopConfig;
use staffloop::io::prompt::PromptBuilder;

fn request() -> ChangeRequest {
    ChangeRequest::new("Add a README section named Usage that says `run make`.")
        .expect("request")
}

#[test]
#[ignore]
fn anthropic_planner_answers() {
    let cfg = LoopConfig::default();
    let client = build_client("planner", &cfg.planner, Path::new(".")).expect("client");
    let reply = client
        .complete(&CompletionRequest {
            system: Some("Answer with one word.".to_string()),
            prompt: "Say hello.".to_string(),
            max_tokens: 16,
        })
        .expect("complete");
    println!("planner reply: {reply}");
    assert!(!reply.trim().is_empty());
}

#[test]
#[ignore]
fn openai_generator_returns_a_diff() {
    let cfg = LoopConfig::default();
    let client = build_client("generator", &cfg.generator, Path::new(".")).expect("client");
    let agent = GenerationAgent::new(
        client,
        PromptBuilder::new(cfg.prompt_budget_bytes).expect("prompts"),
        cfg.generator.max_tokens,
    );
    let plan = Plan::new("1. Append a `## Usage` section to README.md containing `run make`.");

    let generation = agent.generate(&plan, &request()).expect("generate");
    println!("generation:\n{}", generation.text());
    assert!(matches!(generation, Generation::Diff(_)));
}

#[test]
#[ignore]
fn anthropic_reviewer_returns_a_parseable_verdict() {
    let cfg = LoopConfig::default();
    let client = build_client("reviewer", &cfg.reviewer, Path::new(".")).expect("client");
    let agent = ReviewAgent::new(
        client,
        PromptBuilder::new(cfg.prompt_budget_bytes).expect("prompts"),
        cfg.reviewer.max_tokens,
    );
    let diff = "diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1,4 @@\n # demo\n+\n+## Usage\n+run make\n";
    let files = vec!["README.md".to_string()];

    let review = agent
        .review(&ReviewInput {
            request: &request(),
            plan: &Plan::new("1. Add a Usage section."),
            changed_files: &files,
            diff,
        })
        .expect("review");
    println!("raw review: {}", review.raw);
    assert!(!review.parse_failed(), "{:?}", review.parse_error);
}
