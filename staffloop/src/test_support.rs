//! Test doubles and fixtures shared by unit and integration tests.
//!
//! Enabled for `cfg(test)` and for integration tests through the
//! `test-support` feature.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};

use crate::agents::{Generation, Generator, Planner, Review, ReviewInput, Reviewer};
use crate::core::diff::file_headers;
use crate::core::plan::Plan;
use crate::core::types::{ChangeRequest, Outcome, RepositoryContext, Verdict};
use crate::core::verdict::extract_verdict;
use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::git::Git;
use crate::io::patch_store::PatchStore;

/// Scripted replies: `Ok(text)` is returned as-is, `Err(msg)` becomes an error.
pub type Script<T> = Vec<Result<T, String>>;

fn next_reply<T>(queue: &RefCell<VecDeque<Result<T, String>>>, what: &str) -> Result<T> {
    match queue.borrow_mut().pop_front() {
        Some(Ok(value)) => Ok(value),
        Some(Err(message)) => Err(anyhow!(message)),
        None => Err(anyhow!("no scripted {what} reply left")),
    }
}

/// [`CompletionClient`] that replays a script and records every request.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: RefCell<VecDeque<Result<String, String>>>,
    calls: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Script<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.borrow().clone()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.borrow_mut().push(request.clone());
        next_reply(&self.replies, "completion")
    }
}

#[derive(Debug, Default)]
pub struct ScriptedPlanner {
    replies: RefCell<VecDeque<Result<String, String>>>,
    calls: Cell<u32>,
}

impl ScriptedPlanner {
    pub fn new(replies: Script<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _request: &ChangeRequest, _context: &RepositoryContext) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        next_reply(&self.replies, "plan")
    }
}

/// Generator double. Replies are classified exactly like real endpoint output.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<Result<String, String>>>,
    plans: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Script<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            plans: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.plans.borrow().len()
    }

    /// Plan text seen by each call, in order.
    pub fn seen_plans(&self) -> Vec<String> {
        self.plans.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, plan: &Plan, _request: &ChangeRequest) -> Result<Generation> {
        self.plans.borrow_mut().push(plan.as_str().to_string());
        next_reply(&self.replies, "generation").map(Generation::classify)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    replies: RefCell<VecDeque<Result<Review, String>>>,
    files: RefCell<Vec<Vec<String>>>,
}

impl ScriptedReviewer {
    /// Reviewer that returns these verdicts (or errors) in order.
    pub fn new(verdicts: Script<Verdict>) -> Self {
        let replies = verdicts
            .into_iter()
            .map(|reply| {
                reply.map(|verdict| Review {
                    verdict,
                    parse_error: None,
                    raw: String::new(),
                })
            })
            .collect();
        Self {
            replies: RefCell::new(replies),
            files: RefCell::new(Vec::new()),
        }
    }

    /// Reviewer whose raw replies go through verdict extraction.
    pub fn from_replies(raw: Vec<&str>) -> Self {
        let replies = raw
            .into_iter()
            .map(|text| {
                let parsed = extract_verdict(text);
                Ok(Review {
                    verdict: parsed.verdict,
                    parse_error: parsed.parse_error,
                    raw: text.to_string(),
                })
            })
            .collect();
        Self {
            replies: RefCell::new(replies),
            files: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.files.borrow().len()
    }

    /// Changed-file lists passed to each call, in order.
    pub fn seen_files(&self) -> Vec<Vec<String>> {
        self.files.borrow().clone()
    }
}

impl Reviewer for ScriptedReviewer {
    fn review(&self, input: &ReviewInput<'_>) -> Result<Review> {
        self.files.borrow_mut().push(input.changed_files.to_vec());
        next_reply(&self.replies, "review")
    }
}

/// In-memory [`PatchStore`]: "applies" a diff by remembering it.
#[derive(Debug, Default)]
pub struct MemoryPatchStore {
    accept: bool,
    fail_reset: bool,
    current: Option<String>,
    reset_calls: u32,
    apply_calls: u32,
}

impl MemoryPatchStore {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self::default()
    }

    pub fn failing_reset() -> Self {
        Self {
            accept: true,
            fail_reset: true,
            ..Self::default()
        }
    }

    pub fn reset_calls(&self) -> u32 {
        self.reset_calls
    }

    pub fn apply_calls(&self) -> u32 {
        self.apply_calls
    }
}

impl PatchStore for MemoryPatchStore {
    fn reset(&mut self) -> Result<()> {
        self.reset_calls += 1;
        if self.fail_reset {
            bail!("git reset failed");
        }
        self.current = None;
        Ok(())
    }

    fn apply(&mut self, diff: &str) -> Result<bool> {
        self.apply_calls += 1;
        if self.accept {
            self.current = Some(diff.to_string());
        }
        Ok(self.accept)
    }

    fn changed_files(&self) -> Result<Vec<String>> {
        Ok(self.current.as_deref().map(file_headers).unwrap_or_default())
    }

    fn current_diff(&self) -> Result<String> {
        Ok(self.current.clone().unwrap_or_default())
    }
}

pub fn pass_verdict() -> Verdict {
    Verdict {
        outcome: Outcome::Pass,
        reasons: vec!["meets the requirements".to_string()],
        required_changes: Vec::new(),
    }
}

pub fn nonpass_verdict(required_changes: &[&str]) -> Verdict {
    Verdict {
        outcome: Outcome::Nonpass,
        reasons: vec!["incomplete".to_string()],
        required_changes: required_changes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Diff creating `path` with a single line.
pub fn new_file_diff(path: &str, line: &str) -> String {
    format!(
        "diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n@@ -0,0 +1 @@\n+{line}\n"
    )
}

/// Diff appending `world` to the fixture README.
pub fn readme_append_diff() -> String {
    "diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1,2 @@\n hello\n+world\n"
        .to_string()
}

/// Like [`readme_append_diff`], but the context line carries trailing spaces
/// the fixture README does not have.
pub fn whitespace_context_diff() -> String {
    "diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1,2 @@\n hello   \n+world\n"
        .to_string()
}

/// Diff whose context does not match the fixture README.
pub fn bad_context_diff() -> String {
    "diff --git a/README.md b/README.md\n--- a/README.md\n+++ b/README.md\n@@ -1 +1 @@\n-goodbye\n+farewell\n"
        .to_string()
}

/// A throwaway git repository with one commit containing `README.md`.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git_cmd(&["init", "-q"])?;
        repo.git_cmd(&["config", "user.email", "loop@example.com"])?;
        repo.git_cmd(&["config", "user.name", "Loop Test"])?;
        repo.git_cmd(&["config", "commit.gpgsign", "false"])?;
        repo.write_file("README.md", "hello\n")?;
        repo.git_cmd(&["add", "-A"])?;
        repo.git_cmd(&["commit", "-q", "-m", "initial commit"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Git::new(self.path())
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read_file(&self, rel: &str) -> Result<String> {
        let path = self.path().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    /// Every file outside `.git/`, keyed by repo-relative path.
    pub fn snapshot(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut files = BTreeMap::new();
        collect_files(self.path(), self.path(), &mut files)?;
        Ok(files)
    }

    fn git_cmd(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .status()
            .with_context(|| format!("git {}", args.join(" ")))?;
        if !status.success() {
            bail!("git {} failed with {status}", args.join(" "));
        }
        Ok(())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .map_err(|_| anyhow!("{} escaped {}", path.display(), root.display()))?;
            out.insert(rel.to_string_lossy().into_owned(), fs::read(&path)?);
        }
    }
    Ok(())
}
