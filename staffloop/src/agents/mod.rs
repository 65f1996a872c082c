//! The three completion-backed services: planning, generation, and review.
//!
//! Each service is a trait so the loop can be driven by scripted doubles in
//! tests; the `*Agent` types implement them over any [`CompletionClient`].
//!
//! [`CompletionClient`]: crate::io::completion::CompletionClient

pub mod generator;
pub mod planner;
pub mod reviewer;

pub use generator::{Generation, GenerationAgent, Generator};
pub use planner::{Planner, PlanningAgent};
pub use reviewer::{Review, ReviewAgent, ReviewInput, Reviewer};
