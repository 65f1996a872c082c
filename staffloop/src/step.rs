//! One generate → apply → review iteration.
//!
//! Everything that can go wrong with the services is folded into the returned
//! [`IterationRecord`] as a synthetic NONPASS. Only working-tree failures
//! (the [`PatchStore`] itself erroring) propagate, because they leave the
//! repository in an unknown state.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::agents::{Generation, Generator, ReviewInput, Reviewer};
use crate::core::plan::Plan;
use crate::core::types::{ChangeRequest, IterationFailure, IterationRecord};
use crate::io::patch_store::PatchStore;

/// Run iteration `iteration` against the current plan.
#[instrument(skip_all, fields(iteration))]
pub fn run_step<G, S, R>(
    iteration: u32,
    request: &ChangeRequest,
    plan: &Plan,
    generator: &G,
    store: &mut S,
    reviewer: &R,
) -> Result<IterationRecord>
where
    G: Generator + ?Sized,
    S: PatchStore + ?Sized,
    R: Reviewer + ?Sized,
{
    let diff = match generator.generate(plan, request) {
        Ok(Generation::Diff(diff)) => diff,
        Ok(Generation::NotADiff(text)) => {
            return Ok(IterationRecord::failed(
                iteration,
                IterationFailure::NoDiff,
                Some(text),
                None,
            ));
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "generation call failed");
            return Ok(IterationRecord::failed(
                iteration,
                IterationFailure::GenerationError,
                None,
                Some(&format!("{err:#}")),
            ));
        }
    };

    store.reset()?;
    if !store.apply(&diff).context("apply generated diff")? {
        info!("diff rejected by git apply");
        return Ok(IterationRecord::failed(
            iteration,
            IterationFailure::ApplyFailed,
            Some(diff),
            None,
        ));
    }
    let changed_files = store.changed_files()?;
    let current_diff = store.current_diff()?;
    info!(files = changed_files.len(), "diff applied");

    let review = reviewer.review(&ReviewInput {
        request,
        plan,
        changed_files: &changed_files,
        diff: &current_diff,
    });
    let (verdict, failure) = match review {
        Ok(review) if review.parse_failed() => {
            (review.verdict, Some(IterationFailure::ReviewUnparseable))
        }
        Ok(review) => (review.verdict, None),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "review call failed");
            let detail = format!("{err:#}");
            (
                IterationFailure::ReviewError.verdict(Some(&detail)),
                Some(IterationFailure::ReviewError),
            )
        }
    };

    Ok(IterationRecord {
        iteration,
        generated: Some(diff),
        applied: true,
        changed_files,
        verdict,
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Outcome;
    use crate::test_support::{
        MemoryPatchStore, ScriptedGenerator, ScriptedReviewer, new_file_diff, pass_verdict,
    };

    fn request() -> ChangeRequest {
        ChangeRequest::new("add a health endpoint").expect("request")
    }

    #[test]
    fn prose_skips_apply_and_review() {
        let generator = ScriptedGenerator::new(vec![Ok("Sure, here is the change.".to_string())]);
        let reviewer = ScriptedReviewer::new(Vec::new());
        let mut store = MemoryPatchStore::accepting();

        let record = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert_eq!(record.failure, Some(IterationFailure::NoDiff));
        assert_eq!(record.verdict.reasons, vec!["generation did not return a diff"]);
        assert_eq!(record.generated.as_deref(), Some("Sure, here is the change."));
        assert_eq!(store.reset_calls(), 0);
        assert_eq!(store.apply_calls(), 0);
        assert_eq!(reviewer.calls(), 0);
    }

    #[test]
    fn generation_error_becomes_nonpass() {
        let generator = ScriptedGenerator::new(vec![Err("request timed out".to_string())]);
        let reviewer = ScriptedReviewer::new(Vec::new());
        let mut store = MemoryPatchStore::accepting();

        let record = run_step(2, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert_eq!(record.iteration, 2);
        assert_eq!(record.failure, Some(IterationFailure::GenerationError));
        assert!(record.generated.is_none());
        assert!(record.verdict.reasons[0].starts_with("generation call failed: "));
        assert!(record.verdict.reasons[0].contains("request timed out"));
        assert_eq!(store.apply_calls(), 0);
    }

    #[test]
    fn rejected_diff_skips_review() {
        let generator = ScriptedGenerator::new(vec![Ok(new_file_diff("a.txt", "a"))]);
        let reviewer = ScriptedReviewer::new(Vec::new());
        let mut store = MemoryPatchStore::rejecting();

        let record = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert_eq!(record.failure, Some(IterationFailure::ApplyFailed));
        assert!(!record.applied);
        assert_eq!(store.reset_calls(), 1);
        assert_eq!(reviewer.calls(), 0);
    }

    #[test]
    fn applied_diff_is_reviewed_with_changed_files() {
        let generator = ScriptedGenerator::new(vec![Ok(new_file_diff("src/health.rs", "fn h() {}"))]);
        let reviewer = ScriptedReviewer::new(vec![Ok(pass_verdict())]);
        let mut store = MemoryPatchStore::accepting();

        let record = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert!(record.applied);
        assert_eq!(record.verdict.outcome, Outcome::Pass);
        assert_eq!(record.failure, None);
        assert_eq!(record.changed_files, vec!["src/health.rs"]);
        assert_eq!(reviewer.seen_files(), vec![vec!["src/health.rs".to_string()]]);
    }

    #[test]
    fn review_error_becomes_nonpass_after_apply() {
        let generator = ScriptedGenerator::new(vec![Ok(new_file_diff("a.txt", "a"))]);
        let reviewer = ScriptedReviewer::new(vec![Err("HTTP 529".to_string())]);
        let mut store = MemoryPatchStore::accepting();

        let record = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert!(record.applied);
        assert_eq!(record.failure, Some(IterationFailure::ReviewError));
        assert!(record.verdict.required_changes.is_empty());
        assert!(record.verdict.reasons[0].contains("HTTP 529"));
    }

    #[test]
    fn unparseable_review_is_flagged() {
        let generator = ScriptedGenerator::new(vec![Ok(new_file_diff("a.txt", "a"))]);
        let reviewer = ScriptedReviewer::from_replies(vec!["no json here"]);
        let mut store = MemoryPatchStore::accepting();

        let record = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer)
            .expect("step");

        assert_eq!(record.failure, Some(IterationFailure::ReviewUnparseable));
        assert_eq!(
            record.verdict.reasons,
            vec!["reviewer output was not valid structured data"]
        );
    }

    #[test]
    fn store_failure_propagates() {
        let generator = ScriptedGenerator::new(vec![Ok(new_file_diff("a.txt", "a"))]);
        let reviewer = ScriptedReviewer::new(Vec::new());
        let mut store = MemoryPatchStore::failing_reset();

        let result = run_step(1, &request(), &Plan::new("p"), &generator, &mut store, &reviewer);
        assert!(result.is_err());
    }
}
