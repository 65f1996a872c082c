//! Final run report rendering.

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The reviewer passed the diff produced in `iteration`.
    Pass { iteration: u32 },
    /// `iterations` cycles ran without a PASS.
    Exhausted { iterations: u32 },
}

impl RunOutcome {
    pub fn is_pass(self) -> bool {
        matches!(self, RunOutcome::Pass { .. })
    }

    /// One-line outcome, e.g. `PASS (iteration 1)`.
    pub fn headline(self) -> String {
        match self {
            RunOutcome::Pass { iteration } => format!("PASS (iteration {iteration})"),
            RunOutcome::Exhausted { iterations } => {
                format!("NONPASS (exhausted {iterations} iterations)")
            }
        }
    }
}

/// Artifact locations referenced from the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPointers {
    pub plan: String,
    pub patch: String,
    pub verdict: String,
    pub iterations: String,
}

/// Everything the report document states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Final plan text, in full.
    pub plan: String,
    /// Files changed in the working tree at exit; empty after a rejected apply.
    pub changed_files: Vec<String>,
    pub pointers: ReportPointers,
}

impl RunReport {
    /// Render the Markdown report document.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        buf.push_str("# Staffloop Report\n\n");
        buf.push_str("## Verdict\n\n");
        buf.push_str(&self.outcome.headline());
        buf.push_str("\n\n");

        if self.outcome.is_pass() {
            buf.push_str("## Plan\n\n");
        } else {
            buf.push_str("## Last Plan\n\n");
        }
        buf.push_str(self.plan.trim_end());
        buf.push_str("\n\n");

        buf.push_str("## Changed files\n\n");
        if self.changed_files.is_empty() {
            buf.push_str("(none)\n");
        } else {
            for path in &self.changed_files {
                buf.push_str(&format!("- {path}\n"));
            }
        }
        buf.push('\n');

        buf.push_str("## Artifacts\n\n");
        buf.push_str(&format!("- Plan: `{}`\n", self.pointers.plan));
        buf.push_str(&format!("- Latest patch: `{}`\n", self.pointers.patch));
        buf.push_str(&format!("- Latest verdict: `{}`\n", self.pointers.verdict));
        buf.push_str(&format!(
            "- Per-iteration logs: `{}`\n",
            self.pointers.iterations
        ));
        buf
    }
}
