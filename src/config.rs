//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file, then environment-style
//! key/value overrides are applied once at process start. The resulting
//! [`Config`] is passed down by reference; nothing below `main` reads the
//! process environment.
//!
//! ```toml
//! [fetcher]
//! timeout_secs = 5
//! max_bytes = 1048576
//! allowed_content_types = ["text/", "application/json"]
//!
//! [connectors]
//! limit = 5
//! timeout_ms = 10000
//! enabled = ["wikipedia", "google_news", "rdap", "github_users"]
//!
//! [retry]
//! attempts = 3
//! base_delay_ms = 500
//!
//! [audit]
//! dir = "./data/audit"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::traits::BUILTIN_CONNECTORS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
            allowed_content_types: default_content_types(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_fetch_timeout() -> u64 {
    5
}
fn default_max_bytes() -> usize {
    1024 * 1024
}
fn default_content_types() -> Vec<String> {
    vec!["text/".to_string(), "application/json".to_string()]
}
fn default_user_agent() -> String {
    "evidence-harness-fetcher".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorsConfig {
    /// Maximum documents requested from each source.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Wall-clock budget for one connector call, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Connectors to run, in fan-in order.
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            timeout_ms: default_timeout_ms(),
            enabled: default_enabled(),
        }
    }
}

fn default_limit() -> usize {
    5
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_enabled() -> Vec<String> {
    BUILTIN_CONNECTORS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuditConfig {
    /// Directory holding one `<YYYY-MM-DD>.jsonl` ledger per day.
    /// When unset the audit log lives in memory only.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Apply environment-style overrides (`FETCHER_MAX_BYTES=...`).
    ///
    /// Unknown keys are ignored so the whole process environment can be
    /// passed in. Values that fail to parse are errors.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let value = value.as_ref().trim();
            match key {
                "FETCHER_TIMEOUT" => self.fetcher.timeout_secs = parse_var(key, value)?,
                "FETCHER_MAX_BYTES" => self.fetcher.max_bytes = parse_var(key, value)?,
                "FETCHER_ALLOWED_MIME_PREFIXES" => {
                    self.fetcher.allowed_content_types = value
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "CONNECTOR_LIMIT" => self.connectors.limit = parse_var(key, value)?,
                "CONNECTOR_TIMEOUT_MS" => self.connectors.timeout_ms = parse_var(key, value)?,
                "RETRY_ATTEMPTS" => self.retry.attempts = parse_var(key, value)?,
                "RETRY_BASE_DELAY_MS" => self.retry.base_delay_ms = parse_var(key, value)?,
                "AUDIT_DIR" => {
                    self.audit.dir = if value.is_empty() {
                        None
                    } else {
                        Some(PathBuf::from(value))
                    };
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetcher.timeout_secs == 0 {
            bail!("fetcher.timeout_secs must be > 0");
        }
        if self.fetcher.max_bytes == 0 {
            bail!("fetcher.max_bytes must be > 0");
        }
        if self.fetcher.allowed_content_types.is_empty() {
            bail!("fetcher.allowed_content_types must not be empty");
        }
        if self.connectors.limit < 1 {
            bail!("connectors.limit must be >= 1");
        }
        if self.connectors.timeout_ms < 1 {
            bail!("connectors.timeout_ms must be >= 1");
        }
        if self.retry.attempts < 1 {
            bail!("retry.attempts must be >= 1");
        }
        for name in &self.connectors.enabled {
            if !BUILTIN_CONNECTORS.contains(&name.as_str()) {
                bail!(
                    "Unknown connector: '{}'. Available: {}",
                    name,
                    BUILTIN_CONNECTORS.join(", ")
                );
            }
        }
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))
}

/// Load the config file at `path`, falling back to defaults when it does
/// not exist. Overrides are not applied here; see [`Config::apply_overrides`].
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    config.validate()?;
    Ok(config)
}
