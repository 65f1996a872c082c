//! Git adapter for the loop.
//!
//! The working tree is the loop's only mutable shared resource, so every
//! mutation goes through a small, explicit wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// Render back to a porcelain line.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.code, self.path)
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Fail unless the workdir is inside a git work tree.
    pub fn ensure_work_tree(&self) -> Result<()> {
        let out = self
            .run_capture(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("{} is not a git repository", self.workdir.display()))?;
        if out.trim() != "true" {
            return Err(anyhow!(
                "{} is not inside a git work tree",
                self.workdir.display()
            ));
        }
        Ok(())
    }

    /// Return the current HEAD short SHA (errors when there is no commit yet).
    pub fn head_short_sha(&self, len: usize) -> Result<String> {
        let arg = format!("--short={len}");
        let out = self
            .run_capture(&["rev-parse", &arg, "HEAD"])
            .context("resolve baseline revision (does the repository have a commit?)")?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Discard all staged and unstaged changes to tracked files.
    ///
    /// Files that only exist in the index (added by a previous `apply --index`)
    /// are removed from the tree as well. Untracked files are left alone.
    #[instrument(skip_all)]
    pub fn reset_hard(&self) -> Result<()> {
        debug!("resetting working tree to HEAD");
        self.run_checked(&["reset", "--hard", "--quiet", "HEAD"])?;
        Ok(())
    }

    /// Apply a patch file to the tree and index.
    ///
    /// Context lines that differ from the tree only in whitespace still match.
    /// Returns `Ok(false)` when git rejects the patch; `git apply` is atomic, so
    /// a rejected patch leaves the tree untouched.
    #[instrument(skip_all, fields(patch = %patch_path.display()))]
    pub fn apply_to_index(&self, patch_path: &Path) -> Result<bool> {
        let patch = patch_path.to_string_lossy();
        let args = [
            "apply",
            "--index",
            "--ignore-whitespace",
            "--whitespace=nowarn",
            patch.as_ref(),
        ];
        let output = self.run(&args)?;
        if output.status.success() {
            debug!("patch applied");
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(exit_code = ?output.status.code(), stderr = %stderr.trim(), "git apply rejected patch");
        Ok(false)
    }

    /// Paths staged relative to HEAD.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only", "HEAD"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Staged diff relative to HEAD.
    pub fn staged_diff(&self) -> Result<String> {
        self.run_capture(&["diff", "--cached", "HEAD"])
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
