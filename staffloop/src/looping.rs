//! The plan → (generate → apply → review)* loop.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::agents::{Generator, Planner, Reviewer};
use crate::core::plan::Plan;
use crate::core::report::{RunOutcome, RunReport};
use crate::core::types::{ChangeRequest, IterationFailure, IterationRecord, RepositoryContext};
use crate::io::artifacts::ArtifactStore;
use crate::io::patch_store::PatchStore;
use crate::step::run_step;

/// The three services a run talks to.
#[derive(Debug, Clone)]
pub struct Services<P, G, R> {
    pub planner: P,
    pub generator: G,
    pub reviewer: R,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Maximum iterations; must be > 0.
    pub max_iters: u32,
    /// Pause after a NONPASS before the next iteration. Skipped after the last one.
    pub iteration_delay: Duration,
}

/// Controller state after planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Iterating { iteration: u32 },
    PassDone { iteration: u32 },
    Exhausted { iterations: u32 },
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub outcome: RunOutcome,
    pub plan: Plan,
    pub iterations: Vec<IterationRecord>,
    pub report: RunReport,
}

/// Plan once, then iterate until the reviewer passes a diff or `max_iters` runs out.
///
/// Per-iteration service failures become NONPASS iterations. Planning failures,
/// working-tree failures, and artifact write failures stop the run with an error
/// and no report.
#[instrument(skip_all, fields(max_iters = settings.max_iters))]
pub fn run_loop<P, G, R, S, F>(
    request: &ChangeRequest,
    context: &RepositoryContext,
    services: &Services<P, G, R>,
    store: &mut S,
    artifacts: &ArtifactStore,
    settings: LoopSettings,
    mut on_iteration: F,
) -> Result<LoopOutcome>
where
    P: Planner,
    G: Generator,
    R: Reviewer,
    S: PatchStore + ?Sized,
    F: FnMut(&IterationRecord),
{
    artifacts.prepare()?;

    let plan_text = services
        .planner
        .plan(request, context)
        .context("planning failed")?;
    let mut plan = Plan::new(plan_text);
    artifacts.write_plan(plan.as_str())?;
    info!(plan_bytes = plan.len(), "plan written");

    let mut records: Vec<IterationRecord> = Vec::new();
    let mut last_changed: Vec<String> = Vec::new();
    let mut state = LoopState::Iterating { iteration: 1 };

    let outcome = loop {
        match state {
            LoopState::PassDone { iteration } => break RunOutcome::Pass { iteration },
            LoopState::Exhausted { iterations } => break RunOutcome::Exhausted { iterations },
            LoopState::Iterating { iteration } if iteration > settings.max_iters => {
                state = LoopState::Exhausted {
                    iterations: settings.max_iters,
                };
            }
            LoopState::Iterating { iteration } => {
                let started = Instant::now();
                let record = run_step(
                    iteration,
                    request,
                    &plan,
                    &services.generator,
                    store,
                    &services.reviewer,
                )?;

                artifacts.write_patch(record.generated.as_deref())?;
                artifacts.write_verdict(&record)?;
                artifacts.write_iteration(&record, started.elapsed())?;
                // A rejected apply ran after a reset, so the tree holds no changes.
                if record.applied {
                    last_changed.clone_from(&record.changed_files);
                } else if record.failure == Some(IterationFailure::ApplyFailed) {
                    last_changed.clear();
                }
                info!(
                    iteration,
                    verdict = %record.verdict.outcome,
                    failure = ?record.failure,
                    "iteration finished"
                );
                on_iteration(&record);

                if record.verdict.is_pass() {
                    state = LoopState::PassDone { iteration };
                } else {
                    if plan.append_feedback(iteration, &record.verdict.required_changes) {
                        artifacts.write_plan(plan.as_str())?;
                        debug!(plan_bytes = plan.len(), "feedback appended to plan");
                    }
                    if iteration < settings.max_iters && !settings.iteration_delay.is_zero() {
                        thread::sleep(settings.iteration_delay);
                    }
                    state = LoopState::Iterating {
                        iteration: iteration + 1,
                    };
                }
                records.push(record);
            }
        }
    };

    let report = RunReport {
        outcome,
        plan: plan.as_str().to_string(),
        changed_files: last_changed,
        pointers: artifacts.pointers(),
    };
    artifacts.write_report(&report.render())?;
    info!(outcome = %outcome.headline(), "report written");

    Ok(LoopOutcome {
        outcome,
        plan,
        iterations: records,
        report,
    })
}
