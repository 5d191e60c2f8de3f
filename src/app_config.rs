//! Application configuration loading for CLI defaults.
//!
//! Values come from, in increasing priority: built-in defaults, the TOML
//! config file, command-line flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bulkfetch_core::fetch::{Backoff, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use bulkfetch_core::pipeline::DEFAULT_WINDOW;
use bulkfetch_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, PipelineConfig, RetryPolicy, Throttle};
use serde::Deserialize;

use crate::cli::Args;

/// TOML-backed file configuration for bulkfetch defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default maximum attempts per item.
    pub max_attempts: Option<u8>,
    /// Default items per throttle period (0 disables throttling).
    pub rate_limit: Option<u32>,
    /// Default throttle period in milliseconds.
    pub period_ms: Option<u64>,
    /// Default upper bound of the post-success pause in milliseconds.
    pub jitter_ms: Option<u64>,
    /// Stop retrying client errors after the first attempt.
    pub fail_fast: Option<bool>,
    /// Wait with exponential backoff between attempts.
    pub backoff: Option<bool>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }

        if let Some(max_attempts) = self.max_attempts
            && !(1..=10).contains(&max_attempts)
        {
            bail!("Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=10");
        }

        if let Some(rate_limit) = self.rate_limit
            && rate_limit > 10_000
        {
            bail!("Invalid config value for `rate_limit`: {rate_limit}. Expected range: 0..=10000");
        }

        if let Some(period_ms) = self.period_ms
            && !(1..=3_600_000).contains(&period_ms)
        {
            bail!("Invalid config value for `period_ms`: {period_ms}. Expected range: 1..=3600000");
        }

        if let Some(jitter_ms) = self.jitter_ms
            && jitter_ms > 60_000
        {
            bail!("Invalid config value for `jitter_ms`: {jitter_ms}. Expected range: 0..=60000");
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulkfetch/config.toml`
/// 2. `$HOME/.config/bulkfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bulkfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bulkfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file named on the command line, or the default one if it exists.
///
/// An explicitly named file must exist; a missing default file is not an error.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_file_config(path).map(Some);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => read_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Effective settings for one run after merging file config and flags.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub pipeline: PipelineConfig,
    pub throttle: Option<Throttle>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl RunSettings {
    /// Merges `args` over `file` over built-in defaults.
    #[must_use]
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();

        let concurrency = args
            .concurrency
            .or(file.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from);
        let max_attempts = args
            .max_attempts
            .or(file.max_attempts)
            .map_or(DEFAULT_MAX_ATTEMPTS, u32::from);
        let rate_limit = args.rate_limit.or(file.rate_limit).unwrap_or(0);
        let period = args
            .period_ms
            .or(file.period_ms)
            .map_or(DEFAULT_WINDOW, Duration::from_millis);
        let jitter = Duration::from_millis(args.jitter_ms.or(file.jitter_ms).unwrap_or(0));

        let mut policy = RetryPolicy::with_max_attempts(max_attempts).success_jitter(jitter);
        if args.fail_fast || file.fail_fast.unwrap_or(false) {
            policy = policy.fail_fast_on_permanent();
        }
        if args.backoff || file.backoff.unwrap_or(false) {
            policy = policy.backoff(Backoff::exponential());
        }

        Self {
            pipeline: PipelineConfig::default()
                .with_concurrency(concurrency)
                .with_retry_policy(policy),
            throttle: Throttle::from_rate(rate_limit as usize, period),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }
}
