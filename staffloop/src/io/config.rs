//! Loop configuration stored in `staffloop.toml`.
//!
//! The file is optional and partial: any keys it sets are layered over the
//! built-in defaults, then CLI/environment overrides are applied on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config file name, resolved against the repository root.
pub const CONFIG_FILE_NAME: &str = "staffloop.toml";

/// Transport used to reach a completion endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Responses API.
    Openai,
    /// Local command: prompt on stdin, reply on stdout.
    Command,
}

impl Backend {
    /// Environment variable holding this backend's API key, if it needs one.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            Backend::Anthropic => Some("ANTHROPIC_API_KEY"),
            Backend::Openai => Some("OPENAI_API_KEY"),
            Backend::Command => None,
        }
    }
}

/// Settings for one of the three services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub backend: Backend,
    /// Model name sent to HTTP backends.
    pub model: String,
    /// Upper bound on response tokens.
    pub max_tokens: u32,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Override the API origin (e.g. a proxy). Defaults to the vendor URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Argv for the `command` backend.
    #[serde(default)]
    pub command: Vec<String>,
}

impl EndpointConfig {
    fn anthropic(max_tokens: u32, timeout_secs: u64) -> Self {
        Self {
            backend: Backend::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            max_tokens,
            timeout_secs,
            base_url: None,
            command: Vec::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self, role: &str) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("{role}.timeout_secs must be > 0"));
        }
        if self.max_tokens == 0 {
            return Err(anyhow!("{role}.max_tokens must be > 0"));
        }
        match self.backend {
            Backend::Command => {
                if self.command.is_empty() || self.command[0].trim().is_empty() {
                    return Err(anyhow!(
                        "{role}.command must be a non-empty array for the command backend"
                    ));
                }
            }
            Backend::Anthropic | Backend::Openai => {
                if self.model.trim().is_empty() {
                    return Err(anyhow!("{role}.model must not be empty"));
                }
            }
        }
        Ok(())
    }
}

/// Loop configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoopConfig {
    /// Maximum generate → apply → review cycles. Must be > 0.
    pub max_iters: u32,
    /// Pause between a NONPASS review and the next iteration, in milliseconds.
    pub iteration_delay_ms: u64,
    /// Artifact directory, relative to the repository root unless absolute.
    pub artifacts_dir: PathBuf,
    /// Byte budget for a rendered prompt before sections are dropped or truncated.
    pub prompt_budget_bytes: usize,
    pub planner: EndpointConfig,
    pub generator: EndpointConfig,
    pub reviewer: EndpointConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iters: 5,
            iteration_delay_ms: 1_000,
            artifacts_dir: PathBuf::from(".staffloop"),
            prompt_budget_bytes: 400_000,
            planner: EndpointConfig::anthropic(1_400, 120),
            generator: EndpointConfig {
                backend: Backend::Openai,
                model: "gpt-5.2-codex".to_string(),
                max_tokens: 32_000,
                timeout_secs: 180,
                base_url: None,
                command: Vec::new(),
            },
            reviewer: EndpointConfig::anthropic(1_600, 120),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(anyhow!("max_iters must be > 0"));
        }
        if self.artifacts_dir.as_os_str().is_empty() {
            return Err(anyhow!("artifacts_dir must not be empty"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        self.planner.validate("planner")?;
        self.generator.validate("generator")?;
        self.reviewer.validate("reviewer")?;
        Ok(())
    }

    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub max_iters: Option<u32>,
    pub artifacts_dir: Option<PathBuf>,
    pub iteration_delay_ms: Option<u64>,
}

/// Apply overrides to a loaded config and re-validate.
pub fn apply_overrides(mut base: LoopConfig, overrides: &ConfigOverrides) -> Result<LoopConfig> {
    if let Some(max_iters) = overrides.max_iters {
        base.max_iters = max_iters;
    }
    if let Some(dir) = &overrides.artifacts_dir {
        base.artifacts_dir = dir.clone();
    }
    if let Some(delay) = overrides.iteration_delay_ms {
        base.iteration_delay_ms = delay;
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file layered over the defaults.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = parse_config(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Parse a (possibly partial) TOML document over the defaults.
pub fn parse_config(contents: &str) -> Result<LoopConfig> {
    let overlay: toml::Table = toml::from_str(contents).context("parse toml")?;
    let mut merged = match toml::Value::try_from(LoopConfig::default())
        .context("serialize default config")?
    {
        toml::Value::Table(table) => table,
        _ => return Err(anyhow!("default config did not serialize to a table")),
    };
    merge_tables(&mut merged, overlay);
    let cfg: LoopConfig = toml::Value::Table(merged)
        .try_into()
        .context("deserialize config")?;
    Ok(cfg)
}

/// Recursively layer `overlay` onto `base`; overlay scalars and arrays replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
        assert_eq!(cfg.max_iters, 5);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("staffloop.toml");
        let cfg = LoopConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_role_defaults() {
        let cfg = parse_config(
            "max_iters = 2\n\n[generator]\ntimeout_secs = 30\n\n[reviewer]\nmodel = \"claude-opus-4-1\"\n",
        )
        .expect("parse");
        assert_eq!(cfg.max_iters, 2);
        assert_eq!(cfg.generator.backend, Backend::Openai);
        assert_eq!(cfg.generator.timeout_secs, 30);
        assert_eq!(cfg.generator.max_tokens, 32_000);
        assert_eq!(cfg.reviewer.model, "claude-opus-4-1");
        assert_eq!(cfg.reviewer.max_tokens, 1_600);
        assert_eq!(cfg.planner, LoopConfig::default().planner);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_config("max_iterations = 3\n").expect_err("should reject typo");
        assert!(format!("{err:#}").contains("max_iterations"));
    }

    #[test]
    fn zero_max_iters_is_invalid() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("staffloop.toml");
        fs::write(&path, "max_iters = 0\n").expect("write");
        let err = load_config(&path).expect_err("should fail");
        assert!(format!("{err:#}").contains("max_iters must be > 0"));
    }

    #[test]
    fn command_backend_requires_argv() {
        let err = parse_config("[planner]\nbackend = \"command\"\n")
            .expect("parse")
            .validate()
            .expect_err("should fail");
        assert!(err.to_string().contains("planner.command"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = ConfigOverrides {
            max_iters: Some(2),
            artifacts_dir: Some(PathBuf::from("out")),
            iteration_delay_ms: Some(0),
        };
        let cfg = apply_overrides(LoopConfig::default(), &overrides).expect("apply");
        assert_eq!(cfg.max_iters, 2);
        assert_eq!(cfg.artifacts_dir, PathBuf::from("out"));
        assert_eq!(cfg.iteration_delay(), Duration::ZERO);

        let bad = ConfigOverrides {
            max_iters: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(LoopConfig::default(), &bad).is_err());
    }

    #[test]
    fn api_key_vars_per_backend() {
        assert_eq!(Backend::Anthropic.api_key_var(), Some("ANTHROPIC_API_KEY"));
        assert_eq!(Backend::Openai.api_key_var(), Some("OPENAI_API_KEY"));
        assert_eq!(Backend::Command.api_key_var(), None);
    }
}
