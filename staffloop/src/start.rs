//! Orchestration for `staffloop run`.
//!
//! Resolves configuration, loads the change request, snapshots the repository,
//! wires the three services to their configured backends, and hands off to
//! [`run_loop`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::agents::{GenerationAgent, PlanningAgent, ReviewAgent};
use crate::core::types::{ChangeRequest, IterationRecord, RepositoryContext};
use crate::io::artifacts::ArtifactStore;
use crate::io::completion::build_client;
use crate::io::config::{CONFIG_FILE_NAME, ConfigOverrides, LoopConfig, apply_overrides, load_config};
use crate::io::git::Git;
use crate::io::patch_store::GitPatchStore;
use crate::io::prompt::PromptBuilder;
use crate::looping::{LoopOutcome, LoopSettings, Services, run_loop};

/// Length of the abbreviated HEAD revision shown to the planner.
const HEAD_SHA_LEN: usize = 7;

/// Inputs for one `staffloop run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Repository root.
    pub workdir: PathBuf,
    /// Change-request file, relative to `workdir` unless absolute.
    pub request_path: PathBuf,
    /// Config file; defaults to `<workdir>/staffloop.toml`.
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

/// Read the change request, rejecting empty files.
pub fn load_change_request(path: &Path) -> Result<ChangeRequest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read change request {}", path.display()))?;
    ChangeRequest::new(text).with_context(|| format!("invalid change request {}", path.display()))
}

/// Snapshot HEAD and the porcelain status, skipping entries under `ignore_prefix`.
pub fn capture_repository_context(
    git: &Git,
    ignore_prefix: Option<&str>,
) -> Result<RepositoryContext> {
    let head = git.head_short_sha(HEAD_SHA_LEN)?;
    let status = git
        .status_porcelain()?
        .into_iter()
        .filter(|entry| ignore_prefix.is_none_or(|prefix| !entry.path.starts_with(prefix)))
        .map(|entry| entry.to_line())
        .collect();
    Ok(RepositoryContext { head, status })
}

/// Resolve the effective config for `options`.
pub fn resolve_config(options: &RunOptions) -> Result<LoopConfig> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| options.workdir.join(CONFIG_FILE_NAME));
    let cfg = load_config(&config_path)?;
    apply_overrides(cfg, &options.overrides).context("apply command-line overrides")
}

/// Run the full loop in `options.workdir`.
pub fn start_run<F: FnMut(&IterationRecord)>(
    options: &RunOptions,
    on_iteration: F,
) -> Result<LoopOutcome> {
    let workdir = options.workdir.as_path();
    debug!(workdir = %workdir.display(), "starting run");
    let git = Git::new(workdir);
    git.ensure_work_tree()?;

    let cfg = resolve_config(options)?;
    let request = load_change_request(&workdir.join(&options.request_path))?;

    let prompts = PromptBuilder::new(cfg.prompt_budget_bytes)?;
    let services = Services {
        planner: PlanningAgent::new(
            build_client("planner", &cfg.planner, workdir)?,
            prompts.clone(),
            cfg.planner.max_tokens,
        ),
        generator: GenerationAgent::new(
            build_client("generator", &cfg.generator, workdir)?,
            prompts.clone(),
            cfg.generator.max_tokens,
        ),
        reviewer: ReviewAgent::new(
            build_client("reviewer", &cfg.reviewer, workdir)?,
            prompts,
            cfg.reviewer.max_tokens,
        ),
    };

    let artifacts = ArtifactStore::new(workdir, &cfg.artifacts_dir);
    let context = capture_repository_context(&git, artifacts.repo_relative_prefix().as_deref())?;
    info!(head = %context.head, clean = context.is_clean(), "repository context captured");

    let mut store = GitPatchStore::new(git);
    run_loop(
        &request,
        &context,
        &services,
        &mut store,
        &artifacts,
        LoopSettings {
            max_iters: cfg.max_iters,
            iteration_delay: cfg.iteration_delay(),
        },
        on_iteration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn blank_change_request_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("input.md");
        fs::write(&path, " \n\t\n").expect("write");
        let err = load_change_request(&path).expect_err("should reject");
        assert!(format!("{err:#}").contains("invalid change request"));
    }

    #[test]
    fn missing_change_request_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_change_request(&temp.path().join("input.md")).is_err());
    }

    #[test]
    fn context_ignores_artifact_dir() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file(".staffloop/plan.md", "old plan").expect("write");
        repo.write_file("notes.txt", "mine").expect("write");

        let context = capture_repository_context(&repo.git(), Some(".staffloop/")).expect("context");
        assert_eq!(context.head.len(), HEAD_SHA_LEN);
        assert_eq!(context.status, vec!["?? notes.txt"]);

        let context = capture_repository_context(&repo.git(), None).expect("context");
        assert_eq!(context.status.len(), 2);
    }

    #[test]
    fn clean_repo_summary_says_clean() {
        let repo = TestRepo::new().expect("repo");
        let context = capture_repository_context(&repo.git(), None).expect("context");
        assert!(context.is_clean());
        assert!(context.summary().contains("Repo status: (clean)"));
    }

    #[test]
    fn overrides_win_over_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join(CONFIG_FILE_NAME), "max_iters = 9\n").expect("write");
        let options = RunOptions {
            workdir: temp.path().to_path_buf(),
            request_path: PathBuf::from("input.md"),
            config_path: None,
            overrides: ConfigOverrides {
                max_iters: Some(2),
                ..ConfigOverrides::default()
            },
        };
        assert_eq!(resolve_config(&options).expect("config").max_iters, 2);

        let options = RunOptions {
            overrides: ConfigOverrides::default(),
            ..options
        };
        assert_eq!(resolve_config(&options).expect("config").max_iters, 9);
    }
}
