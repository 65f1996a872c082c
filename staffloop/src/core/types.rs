//! Shared deterministic types for the loop core.
//!
//! These types define stable contracts between the controller, the services,
//! and the artifact writers. They hold no I/O handles.

use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Review outcome for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Nonpass,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Nonpass => "NONPASS",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured judgment of the current diff against the change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Outcome,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub required_changes: Vec<String>,
}

impl Verdict {
    /// A NONPASS verdict with a single reason and no required changes.
    pub fn nonpass(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Nonpass,
            reasons: vec![reason.into()],
            required_changes: Vec::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// Why an iteration ended in a synthetic NONPASS before (or instead of) a real review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationFailure {
    /// Generation answered, but not with a unified diff.
    NoDiff,
    /// The generation call itself failed (transport, status, timeout).
    GenerationError,
    /// `git apply` rejected the diff.
    ApplyFailed,
    /// The review call itself failed (transport, status, timeout).
    ReviewError,
    /// The reviewer answered, but no verdict could be extracted.
    ReviewUnparseable,
}

impl IterationFailure {
    /// Verdict reason recorded for this failure.
    pub fn reason(self) -> &'static str {
        match self {
            IterationFailure::NoDiff => "generation did not return a diff",
            IterationFailure::GenerationError => "generation call failed",
            IterationFailure::ApplyFailed => "patch failed to apply",
            IterationFailure::ReviewError => "review call failed",
            IterationFailure::ReviewUnparseable => "reviewer output was not valid structured data",
        }
    }

    /// Synthetic NONPASS verdict for this failure, optionally naming the underlying error.
    pub fn verdict(self, detail: Option<&str>) -> Verdict {
        match detail.map(str::trim).filter(|s| !s.is_empty()) {
            Some(detail) => Verdict::nonpass(format!("{}: {}", self.reason(), detail)),
            None => Verdict::nonpass(self.reason()),
        }
    }
}

/// Result of one generate → apply → review cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub iteration: u32,
    /// Raw generation output, if the generation call returned at all.
    pub generated: Option<String>,
    /// Whether the diff applied to the working tree.
    pub applied: bool,
    /// Files touched by the applied diff (empty unless `applied`).
    pub changed_files: Vec<String>,
    pub verdict: Verdict,
    /// Set when `verdict` was synthesized rather than returned by the reviewer.
    pub failure: Option<IterationFailure>,
}

impl IterationRecord {
    /// Record an iteration that ended with a synthetic NONPASS.
    pub fn failed(
        iteration: u32,
        failure: IterationFailure,
        generated: Option<String>,
        detail: Option<&str>,
    ) -> Self {
        Self {
            iteration,
            generated,
            applied: false,
            changed_files: Vec::new(),
            verdict: failure.verdict(detail),
            failure: Some(failure),
        }
    }
}

/// Free-text description of the desired change. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest(String);

impl ChangeRequest {
    /// Wrap request text, rejecting empty or whitespace-only input.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            bail!("change request is empty");
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Snapshot of the repository taken once before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    /// Short revision id of HEAD.
    pub head: String,
    /// `git status --porcelain` lines, excluding entries under the artifact directory.
    pub status: Vec<String>,
}

impl RepositoryContext {
    pub fn is_clean(&self) -> bool {
        self.status.is_empty()
    }

    /// Render the context block that seeds the planning prompt.
    pub fn summary(&self) -> String {
        let status = if self.is_clean() {
            "(clean)".to_string()
        } else {
            self.status.join("\n")
        };
        format!("Repo HEAD: {}\nRepo status: {}\n", self.head, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_uppercase() {
        let json = serde_json::to_string(&Outcome::Nonpass).expect("serialize");
        assert_eq!(json, "\"NONPASS\"");
        let parsed: Outcome = serde_json::from_str("\"PASS\"").expect("parse");
        assert_eq!(parsed, Outcome::Pass);
    }

    #[test]
    fn synthetic_verdict_names_cause_and_detail() {
        let verdict = IterationFailure::NoDiff.verdict(None);
        assert_eq!(verdict.outcome, Outcome::Nonpass);
        assert_eq!(verdict.reasons, vec!["generation did not return a diff"]);
        assert!(verdict.required_changes.is_empty());

        let verdict = IterationFailure::ReviewError.verdict(Some("timed out"));
        assert_eq!(verdict.reasons, vec!["review call failed: timed out"]);
    }

    #[test]
    fn change_request_rejects_blank_text() {
        assert!(ChangeRequest::new("  \n\t").is_err());
        let request = ChangeRequest::new("add a health endpoint").expect("request");
        assert_eq!(request.as_str(), "add a health endpoint");
    }

    #[test]
    fn repository_context_summary_marks_clean_tree() {
        let clean = RepositoryContext {
            head: "abc1234".to_string(),
            status: Vec::new(),
        };
        assert_eq!(clean.summary(), "Repo HEAD: abc1234\nRepo status: (clean)\n");

        let dirty = RepositoryContext {
            head: "abc1234".to_string(),
            status: vec![" M src/lib.rs".to_string(), "?? notes.txt".to_string()],
        };
        assert!(!dirty.is_clean());
        assert!(dirty.summary().contains(" M src/lib.rs\n?? notes.txt"));
    }
}
