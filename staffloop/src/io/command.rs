//! Completion backend that shells out to a local command.
//!
//! The rendered prompt is written to the command's stdin and its stdout is the
//! reply. This lets any CLI agent stand in for an HTTP endpoint.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::config::EndpointConfig;
use crate::io::process::run_command_with_timeout;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 4_000_000;

/// [`CompletionClient`] that runs `argv` in `workdir`.
#[derive(Debug, Clone)]
pub struct CommandClient {
    argv: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandClient {
    pub fn new(endpoint: &EndpointConfig, workdir: &Path) -> Self {
        Self {
            argv: endpoint.command.clone(),
            workdir: workdir.to_path_buf(),
            timeout: endpoint.timeout(),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl CompletionClient for CommandClient {
    #[instrument(skip_all, fields(program = ?self.argv.first(), timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("command backend has an empty argv"))?;
        info!("running completion command");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.combined_input().into_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "completion command timed out");
            return Err(anyhow!("{program} timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "{program} failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }
        if output.stdout_truncated > 0 {
            return Err(anyhow!(
                "{program} output exceeded {} bytes",
                self.output_limit_bytes
            ));
        }
        Ok(output.stdout_lossy())
    }
}
