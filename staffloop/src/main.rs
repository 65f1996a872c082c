//! `staffloop`: plan, generate, apply, and review a change until it passes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use staffloop::core::report::RunOutcome;
use staffloop::core::types::IterationRecord;
use staffloop::exit_codes;
use staffloop::io::config::{CONFIG_FILE_NAME, ConfigOverrides, LoopConfig, write_config};
use staffloop::logging;
use staffloop::start::{RunOptions, resolve_config, start_run};

#[derive(Parser)]
#[command(
    name = "staffloop",
    version,
    about = "Plan → generate → apply → review loop driven by completion endpoints"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Location {
    /// Repository root.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
    /// Config file (default: `<workdir>/staffloop.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the loop against the change request.
    Run {
        #[command(flatten)]
        location: Location,
        /// Change-request file, relative to the workdir.
        #[arg(long, default_value = "input.md")]
        request: PathBuf,
        /// Maximum number of iterations.
        #[arg(long, env = "MAX_ITERS")]
        max_iters: Option<u32>,
        /// Artifact directory, relative to the workdir.
        #[arg(long, env = "STAFFLOOP_ARTIFACTS_DIR")]
        artifacts_dir: Option<PathBuf>,
        /// Pause between iterations, in milliseconds.
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Print the effective configuration, or write the defaults with `--init`.
    Config {
        #[command(flatten)]
        location: Location,
        /// Write a default config file.
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file with `--init`.
        #[arg(long, requires = "init")]
        force: bool,
    },
}

fn main() -> ExitCode {
    logging::init();
    // Usage errors exit with INVALID; clap's own code (2) is reserved for NONPASS.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Run {
            location,
            request,
            max_iters,
            artifacts_dir,
            delay_ms,
        } => {
            let options = RunOptions {
                workdir: location.workdir,
                request_path: request,
                config_path: location.config,
                overrides: ConfigOverrides {
                    max_iters,
                    artifacts_dir,
                    iteration_delay_ms: delay_ms,
                },
            };
            cmd_run(&options)
        }
        Command::Config {
            location,
            init,
            force,
        } => cmd_config(&location, init, force),
    }
}

fn cmd_run(options: &RunOptions) -> Result<u8> {
    let outcome = start_run(options, print_iteration)?;
    println!("{}", outcome.outcome.headline());
    Ok(match outcome.outcome {
        RunOutcome::Pass { .. } => exit_codes::OK,
        RunOutcome::Exhausted { .. } => exit_codes::NONPASS,
    })
}

fn print_iteration(record: &IterationRecord) {
    let reason = record
        .verdict
        .reasons
        .first()
        .map(|r| format!(" - {r}"))
        .unwrap_or_default();
    println!(
        "iteration {}: {}{reason}",
        record.iteration, record.verdict.outcome
    );
}

fn cmd_config(location: &Location, init: bool, force: bool) -> Result<u8> {
    let path = location
        .config
        .clone()
        .unwrap_or_else(|| location.workdir.join(CONFIG_FILE_NAME));
    if init {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        write_config(&path, &LoopConfig::default())?;
        println!("wrote {}", path.display());
        return Ok(exit_codes::OK);
    }

    let cfg = resolve_config(&RunOptions {
        workdir: location.workdir.clone(),
        request_path: PathBuf::new(),
        config_path: Some(path),
        overrides: ConfigOverrides::default(),
    })?;
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(exit_codes::OK)
}
