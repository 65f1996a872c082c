//! Append-only planning document.

/// Heading used for every reviewer feedback section.
pub const FEEDBACK_HEADING: &str = "## Reviewer required changes";

/// The cumulative plan passed to generation and review.
///
/// Created once from the planning response. Reviewer feedback is appended as
/// new sections; existing text is never edited or removed, so the length is
/// non-decreasing for the life of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    text: String,
    feedback_sections: u32,
}

impl Plan {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            feedback_sections: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of feedback sections appended so far.
    pub fn feedback_sections(&self) -> u32 {
        self.feedback_sections
    }

    /// Append the reviewer's required changes from `iteration` as a new section.
    ///
    /// Blank items are skipped. Returns `false` (leaving the plan untouched) when
    /// nothing remains to append.
    pub fn append_feedback(&mut self, iteration: u32, required_changes: &[String]) -> bool {
        let items: Vec<&str> = required_changes
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .collect();
        if items.is_empty() {
            return false;
        }

        self.text.push_str("\n\n---\n\n");
        self.text
            .push_str(&format!("{FEEDBACK_HEADING} (iteration {iteration})\n"));
        for item in items {
            self.text.push_str(&format!("- {item}\n"));
        }
        self.feedback_sections += 1;
        true
    }
}
