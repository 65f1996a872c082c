//! Transactional patch application against the working tree.
//!
//! The [`PatchStore`] trait is the loop's only handle on the working tree.
//! It is passed explicitly into the controller and mutated through `&mut self`,
//! so there is exactly one owner of the tree for the whole run.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::git::Git;

/// Working-tree operations the loop needs.
pub trait PatchStore {
    /// Discard uncommitted changes, restoring the baseline revision.
    fn reset(&mut self) -> Result<()>;

    /// Apply `diff` atomically. `Ok(false)` means the diff was rejected and the
    /// tree is unchanged; `Err` means the store itself failed.
    fn apply(&mut self, diff: &str) -> Result<bool>;

    /// Paths changed relative to the baseline, in git's order.
    fn changed_files(&self) -> Result<Vec<String>>;

    /// Full diff of the tree relative to the baseline.
    fn current_diff(&self) -> Result<String>;
}

/// [`PatchStore`] backed by `git reset --hard` / `git apply --index`.
#[derive(Debug, Clone)]
pub struct GitPatchStore {
    git: Git,
}

impl GitPatchStore {
    pub fn new(git: Git) -> Self {
        Self { git }
    }
}

impl PatchStore for GitPatchStore {
    fn reset(&mut self) -> Result<()> {
        self.git.reset_hard().context("reset working tree")
    }

    #[instrument(skip_all, fields(diff_bytes = diff.len()))]
    fn apply(&mut self, diff: &str) -> Result<bool> {
        let mut transient = tempfile::Builder::new()
            .prefix("staffloop-")
            .suffix(".diff")
            .tempfile()
            .context("create transient patch file")?;
        transient
            .write_all(diff.as_bytes())
            .context("write transient patch file")?;
        transient.flush().context("flush transient patch file")?;

        let applied = self.git.apply_to_index(transient.path())?;
        debug!(applied, "apply finished");
        Ok(applied)
    }

    fn changed_files(&self) -> Result<Vec<String>> {
        self.git.staged_files().context("list changed files")
    }

    fn current_diff(&self) -> Result<String> {
        self.git.staged_diff().context("read current diff")
    }
}
