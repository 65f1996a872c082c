//! I/O for the loop: git, completion endpoints, prompts, config, and artifacts.

pub mod anthropic;
pub mod artifacts;
pub mod command;
pub mod completion;
pub mod config;
pub mod git;
pub mod openai;
pub mod patch_store;
pub mod process;
pub mod prompt;
