//! Plan → generate → apply → review loop over a git working tree.
//!
//! A planning endpoint turns a change request into a plan. A generation
//! endpoint turns the plan into a unified diff, which is applied to the
//! working tree, and a review endpoint judges the result. Reviewer feedback
//! is appended to the plan until a diff passes or the iteration limit is hit.
//!
//! - **[`core`]**: Pure, deterministic logic (plan accumulation, diff checks,
//!   verdict extraction, report rendering). No I/O.
//! - **[`io`]**: Side-effecting operations (git, HTTP and command endpoints,
//!   config, artifacts).
//! - **[`agents`]**: The planning, generation, and review services.
//!
//! Orchestration lives in [`step`] (one iteration), [`looping`] (the controller),
//! and [`start`] (wiring for `staffloop run`).

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod start;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
