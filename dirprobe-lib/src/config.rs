//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `DP_*`
//! environment variables, and merging them with proper precedence rules.

use crate::error::ProbeError;
use crate::types::{ProbeConfig, MAX_POOL_SIZE, MAX_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// pool_size = 32
/// timeout = "3s"
/// status = "200,301-308,403"
///
/// [output]
/// format = "json"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Output formatting preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    /// Number of probes allowed in flight at once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<usize>,

    /// Per-probe timeout (as string, e.g. "1500ms", "5s", "1m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Status filter expression, e.g. "200,301-308,4xx"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http1_only: Option<bool>,
}

impl DefaultsConfig {
    /// Overlay the values set here onto `config`.
    ///
    /// Timeouts were checked by [`ConfigManager::load_file`]; an unparsable
    /// one is left out.
    pub fn apply_to(&self, mut config: ProbeConfig) -> ProbeConfig {
        if let Some(pool_size) = self.pool_size {
            config = config.with_pool_size(pool_size);
        }
        if let Some(timeout) = self.timeout.as_deref().and_then(parse_timeout_string) {
            config = config.with_timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        if let Some(http1_only) = self.http1_only {
            config = config.with_http1_only(http1_only);
        }
        config
    }
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Default output format: "text", "json" or "csv"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Pretty-print JSON by default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_pretty: Option<bool>,
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which config files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load and validate configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, ProbeError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ProbeError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ProbeError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        self.validate_config(&config)?;

        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Lowest to highest: XDG config, `~/.dirprobe.toml`, then
    /// `./dirprobe.toml` or `./.dirprobe.toml`. Files that fail to parse
    /// are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, ProbeError> {
        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => tracing::warn!("ignoring config file: {}", e),
            }
        }

        if self.verbose && loaded_files.len() > 1 {
            for (i, path) in loaded_files.iter().enumerate() {
                let role = if i == loaded_files.len() - 1 {
                    "highest precedence"
                } else {
                    "overridden where set later"
                };
                tracing::info!(path = %path.display(), "config file in use ({})", role);
            }
        }

        Ok(merged_config)
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./dirprobe.toml", "./.dirprobe.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".dirprobe.toml", "dirprobe.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// `$XDG_CONFIG_HOME/dirprobe/config.toml`, falling back to `~/.config`.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("dirprobe").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations. Values from `higher` win field by field.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower), Some(higher)) => Some(DefaultsConfig {
                    pool_size: higher.pool_size.or(lower.pool_size),
                    timeout: higher.timeout.or(lower.timeout),
                    user_agent: higher.user_agent.or(lower.user_agent),
                    status: higher.status.or(lower.status),
                    http1_only: higher.http1_only.or(lower.http1_only),
                }),
                (lower, higher) => higher.or(lower),
            },
            output: match (lower.output, higher.output) {
                (Some(lower), Some(higher)) => Some(OutputConfig {
                    format: higher.format.or(lower.format),
                    json_pretty: higher.json_pretty.or(lower.json_pretty),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    fn validate_config(&self, config: &FileConfig) -> Result<(), ProbeError> {
        if let Some(defaults) = &config.defaults {
            if let Some(pool_size) = defaults.pool_size {
                if pool_size == 0 || pool_size > MAX_POOL_SIZE {
                    return Err(ProbeError::config(format!(
                        "pool_size must be between 1 and {}",
                        MAX_POOL_SIZE
                    )));
                }
            }

            if let Some(timeout_str) = &defaults.timeout {
                if parse_timeout_string(timeout_str).is_none() {
                    return Err(ProbeError::config(format!(
                        "Invalid timeout format '{}'. Use format like '1500ms', '5s', '1m'",
                        timeout_str
                    )));
                }
            }

            if let Some(status) = &defaults.status {
                status.parse::<crate::StatusFilter>()?;
            }
        }

        if let Some(format) = config.output.as_ref().and_then(|o| o.format.as_deref()) {
            if !matches!(format, "text" | "json" | "csv") {
                return Err(ProbeError::config(format!(
                    "Unknown output format '{}'. Use 'text', 'json' or 'csv'",
                    format
                )));
            }
        }

        Ok(())
    }
}

/// Configuration values set through `DP_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub pool_size: Option<usize>,
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub status: Option<String>,
    pub json: Option<bool>,
    pub csv: Option<bool>,
    pub wordlist: Option<String>,
    pub config: Option<String>,
    pub http1_only: Option<bool>,
}

impl EnvConfig {
    /// Overlay the probe settings found in the environment onto `config`.
    pub fn apply_to(&self, mut config: ProbeConfig) -> ProbeConfig {
        if let Some(pool_size) = self.pool_size {
            config = config.with_pool_size(pool_size);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        if let Some(http1_only) = self.http1_only {
            config = config.with_http1_only(http1_only);
        }
        config
    }

    /// JSON and CSV were both requested.
    pub fn has_output_format_conflict(&self) -> bool {
        matches!((self.json, self.csv), (Some(true), Some(true)))
    }
}

/// Load configuration from environment variables.
///
/// Invalid values are ignored with a warning. With `verbose`, every value
/// taken from the environment is logged.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    load_env_config_from(verbose, |name| env::var(name).ok())
}

fn load_env_config_from<F>(verbose: bool, lookup: F) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let report = |name: &str, value: &str| {
        if verbose {
            tracing::info!("using {}={}", name, value);
        }
    };
    let text = |name: &str| {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .inspect(|v| report(name, v.as_str()))
    };
    let flag = |name: &str| {
        let raw = lookup(name)?;
        match parse_bool(&raw) {
            Some(value) => {
                report(name, raw.as_str());
                Some(value)
            }
            None => {
                tracing::warn!("invalid {}='{}', use true/false", name, raw);
                None
            }
        }
    };

    let pool_size = lookup("DP_POOL_SIZE").and_then(|raw| match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 && n <= MAX_POOL_SIZE => {
            report("DP_POOL_SIZE", raw.as_str());
            Some(n)
        }
        _ => {
            tracing::warn!("invalid DP_POOL_SIZE='{}', must be 1-{}", raw, MAX_POOL_SIZE);
            None
        }
    });

    let timeout = lookup("DP_TIMEOUT").and_then(|raw| match parse_timeout_string(&raw) {
        Some(timeout) => {
            report("DP_TIMEOUT", raw.as_str());
            Some(timeout)
        }
        None => {
            tracing::warn!(
                "invalid DP_TIMEOUT='{}', use format like '1500ms', '5s', '1m'",
                raw
            );
            None
        }
    });

    EnvConfig {
        pool_size,
        timeout,
        user_agent: text("DP_USER_AGENT"),
        status: text("DP_STATUS"),
        json: flag("DP_JSON"),
        csv: flag("DP_CSV"),
        wordlist: text("DP_WORDLIST"),
        config: text("DP_CONFIG"),
        http1_only: flag("DP_HTTP1_ONLY"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a timeout like "1500ms", "5s" or "2m".
///
/// A bare number is taken as milliseconds. Zero and anything above
/// [`MAX_TIMEOUT`] are rejected.
pub fn parse_timeout_string(timeout_str: &str) -> Option<Duration> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let duration = if let Some(ms) = timeout_str.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(s) = timeout_str.strip_suffix('s') {
        s.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(m) = timeout_str.strip_suffix('m') {
        m.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        timeout_str.parse::<u64>().ok().map(Duration::from_millis)
    }?;

    (!duration.is_zero() && duration <= MAX_TIMEOUT).then_some(duration)
}
