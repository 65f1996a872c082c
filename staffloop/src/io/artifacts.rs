//! Artifact writers for the run directory (default `.staffloop/`).
//!
//! Layout:
//! - `plan.md`, `patch.diff`, `verify.json`: latest state, overwritten as the run progresses.
//! - `report.md`: written once when the loop exits.
//! - `iterations/<n>/{meta.json,patch.diff,verify.json}`: per-iteration log.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::report::ReportPointers;
use crate::core::types::{IterationFailure, IterationRecord, Outcome};

/// Resolved artifact locations.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub patch_path: PathBuf,
    pub verdict_path: PathBuf,
    pub report_path: PathBuf,
    pub iterations_dir: PathBuf,
}

impl ArtifactPaths {
    /// `dir` is resolved against `root` unless it is absolute.
    pub fn new(root: &Path, dir: &Path) -> Self {
        let dir = root.join(dir);
        Self {
            plan_path: dir.join("plan.md"),
            patch_path: dir.join("patch.diff"),
            verdict_path: dir.join("verify.json"),
            report_path: dir.join("report.md"),
            iterations_dir: dir.join("iterations"),
            dir,
        }
    }

    pub fn iteration_dir(&self, iteration: u32) -> PathBuf {
        self.iterations_dir.join(iteration.to_string())
    }
}

/// Verdict document written to `verify.json`.
#[derive(Debug, Serialize)]
struct VerdictRecord<'a> {
    iteration: u32,
    verdict: Outcome,
    reasons: &'a [String],
    required_changes: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<IterationFailure>,
}

impl<'a> VerdictRecord<'a> {
    fn from_record(record: &'a IterationRecord) -> Self {
        Self {
            iteration: record.iteration,
            verdict: record.verdict.outcome,
            reasons: &record.verdict.reasons,
            required_changes: &record.verdict.required_changes,
            failure: record.failure,
        }
    }
}

#[derive(Debug, Serialize)]
struct IterationMeta<'a> {
    iteration: u32,
    verdict: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<IterationFailure>,
    generated: bool,
    applied: bool,
    changed_files: &'a [String],
    duration_ms: u64,
}

/// Writes every document the loop produces.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    paths: ArtifactPaths,
}

impl ArtifactStore {
    pub fn new(root: &Path, dir: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            paths: ArtifactPaths::new(root, dir),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Artifact directory relative to the repository root, with a trailing `/`,
    /// or `None` when it lives outside the repository.
    pub fn repo_relative_prefix(&self) -> Option<String> {
        let relative = self.paths.dir.strip_prefix(&self.root).ok()?;
        let text = relative.to_str()?.trim_end_matches('/');
        (!text.is_empty()).then(|| format!("{text}/"))
    }

    /// Create the directory, clear old per-iteration logs, and remove a stale report.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.dir)
            .with_context(|| format!("create artifact dir {}", self.paths.dir.display()))?;
        if self.paths.iterations_dir.exists() {
            fs::remove_dir_all(&self.paths.iterations_dir).with_context(|| {
                format!("clear {}", self.paths.iterations_dir.display())
            })?;
        }
        if self.paths.report_path.exists() {
            fs::remove_file(&self.paths.report_path)
                .with_context(|| format!("remove stale {}", self.paths.report_path.display()))?;
        }
        debug!(dir = %self.paths.dir.display(), "artifact dir prepared");
        Ok(())
    }

    pub fn write_plan(&self, plan: &str) -> Result<()> {
        write_atomic(&self.paths.plan_path, plan)
    }

    /// Overwrite `patch.diff`; `None` (generation call failed) writes an empty file.
    pub fn write_patch(&self, generated: Option<&str>) -> Result<()> {
        write_atomic(&self.paths.patch_path, generated.unwrap_or_default())
    }

    pub fn write_verdict(&self, record: &IterationRecord) -> Result<()> {
        write_json(&self.paths.verdict_path, &VerdictRecord::from_record(record))
    }

    /// Write `iterations/<n>/` for one finished iteration.
    pub fn write_iteration(&self, record: &IterationRecord, elapsed: Duration) -> Result<PathBuf> {
        let dir = self.paths.iteration_dir(record.iteration);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create iteration dir {}", dir.display()))?;

        let meta = IterationMeta {
            iteration: record.iteration,
            verdict: record.verdict.outcome,
            failure: record.failure,
            generated: record.generated.is_some(),
            applied: record.applied,
            changed_files: &record.changed_files,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        write_json(&dir.join("meta.json"), &meta)?;
        write_atomic(
            &dir.join("patch.diff"),
            record.generated.as_deref().unwrap_or_default(),
        )?;
        write_json(&dir.join("verify.json"), &VerdictRecord::from_record(record))?;
        Ok(dir)
    }

    pub fn write_report(&self, report: &str) -> Result<()> {
        write_atomic(&self.paths.report_path, report)
    }

    /// Artifact locations as shown in the report.
    pub fn pointers(&self) -> ReportPointers {
        ReportPointers {
            plan: self.display(&self.paths.plan_path),
            patch: self.display(&self.paths.patch_path),
            verdict: self.display(&self.paths.verdict_path),
            iterations: format!("{}/", self.display(&self.paths.iterations_dir)),
        }
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("artifact path missing parent {}", path.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
