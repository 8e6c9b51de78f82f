//! Application configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use url::Url;

use crate::app_mode::RunMode;
use crate::db::queue_table_name;
use crate::error::UpgradeError;
use crate::logging::LogFormat;

/// Default cron schedule: every 15 minutes
pub const DEFAULT_SCHEDULE: &str = "0 */15 * * * *";

/// Supported provider adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Radarr,
}

impl ProviderKind {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "radarr" => Some(ProviderKind::Radarr),
            _ => None,
        }
    }
}

/// Settings for one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Name used in logs and in the queue table name
    pub name: String,

    pub kind: ProviderKind,

    pub enabled: bool,

    /// Base URL of the provider's API
    pub url: Option<String>,

    pub api_key: Option<String>,

    /// Maximum ids dispatched per cycle
    pub batch_size: usize,
}

impl ProviderConfig {
    /// Validated endpoint and credential. Missing or malformed values are a
    /// per-cycle configuration error for this provider only.
    pub fn connection(&self) -> Result<(Url, &str), UpgradeError> {
        let prefix = env_prefix(&self.name);

        let url = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| UpgradeError::configuration(&self.name, format!("{}_URL is not set", prefix)))?;

        let url = Url::parse(url.trim()).map_err(|e| {
            UpgradeError::configuration(&self.name, format!("{}_URL is invalid: {}", prefix, e))
        })?;

        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                UpgradeError::configuration(&self.name, format!("{}_API_KEY is not set", prefix))
            })?;

        Ok((url, api_key))
    }
}

/// Resource ceilings applied to the cycle child process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum virtual memory in bytes
    pub max_memory_bytes: Option<u64>,

    /// Maximum CPU time in seconds
    pub max_cpu_secs: Option<u64>,
}

impl ResourceLimits {
    pub fn is_unlimited(&self) -> bool {
        self.max_memory_bytes.is_none() && self.max_cpu_secs.is_none()
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite path or `sqlite:` URL
    pub database_url: String,

    /// SQLite pool size
    pub database_max_connections: u32,

    /// Cron expression (seconds first) for recurring mode
    pub schedule: String,

    pub run_mode: RunMode,

    /// Console log encoding for the long-running process
    pub log_format: LogFormat,

    /// Wall-clock limit for one cycle child process
    pub job_timeout: Duration,

    pub resource_limits: ResourceLimits,

    /// Timeout for each provider HTTP request
    pub http_timeout: Duration,

    pub providers: Vec<ProviderConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| "./data/upgradarr.db".to_string());

        let database_max_connections: u32 = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "4".to_string())
            .trim()
            .parse()
            .context("Invalid DATABASE_MAX_CONNECTIONS")?;
        if database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        let job_timeout_secs: f64 = lookup("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|| "1800".to_string())
            .parse()
            .context("Invalid JOB_TIMEOUT_SECS")?;
        if !job_timeout_secs.is_finite() || job_timeout_secs <= 0.0 {
            bail!("JOB_TIMEOUT_SECS must be a positive number of seconds");
        }

        let max_memory_bytes = parse_optional::<u64>(&lookup, "JOB_MAX_MEMORY_MB")?
            .map(|mb| mb.saturating_mul(1024 * 1024));
        let max_cpu_secs = parse_optional::<u64>(&lookup, "JOB_MAX_CPU_SECS")?;

        let http_timeout_secs: u64 = lookup("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("Invalid HTTP_TIMEOUT_SECS")?;

        let run_mode = match lookup("RUN_MODE") {
            Some(value) => RunMode::from_arg(&value)
                .with_context(|| format!("Invalid RUN_MODE '{}'", value))?,
            None => RunMode::Scheduled,
        };

        let log_format = match lookup("LOG_FORMAT") {
            Some(value) => LogFormat::from_str(&value)
                .with_context(|| format!("Invalid LOG_FORMAT '{}'", value))?,
            None => LogFormat::Json,
        };

        let providers = lookup("PROVIDERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| provider_from_lookup(&lookup, name))
            .collect::<Result<Vec<_>>>()?;
        reject_colliding_names(&providers)?;

        Ok(Self {
            database_url,
            database_max_connections,
            schedule: lookup("SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            run_mode,
            log_format,
            job_timeout: Duration::from_secs_f64(job_timeout_secs),
            resource_limits: ResourceLimits {
                max_memory_bytes,
                max_cpu_secs,
            },
            http_timeout: Duration::from_secs(http_timeout_secs),
            providers,
        })
    }

    /// Providers that take part in cycles
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

/// Environment variable prefix for a provider name (`radarr-4k` -> `RADARR_4K`)
pub fn env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Names that normalise to the same variable prefix or queue table would
/// share settings and a queue
fn reject_colliding_names(providers: &[ProviderConfig]) -> Result<()> {
    for (i, provider) in providers.iter().enumerate() {
        let table = queue_table_name(&provider.name);
        if let Some(earlier) = providers[..i]
            .iter()
            .find(|p| queue_table_name(&p.name) == table)
        {
            bail!(
                "Provider names '{}' and '{}' both map to {} (and {}_* variables)",
                earlier.name,
                provider.name,
                table,
                env_prefix(&provider.name)
            );
        }
    }
    Ok(())
}

fn provider_from_lookup<F>(lookup: &F, name: &str) -> Result<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = env_prefix(name);
    let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix));

    let kind_name = var("KIND").unwrap_or_else(|| "radarr".to_string());
    let kind = ProviderKind::from_str(&kind_name)
        .with_context(|| format!("Unknown {}_KIND '{}'", prefix, kind_name))?;

    let enabled = var("ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let batch_size: usize = var("BATCH_SIZE")
        .unwrap_or_else(|| "10".to_string())
        .parse()
        .with_context(|| format!("Invalid {}_BATCH_SIZE", prefix))?;
    if batch_size == 0 {
        bail!("{}_BATCH_SIZE must be at least 1", prefix);
    }

    Ok(ProviderConfig {
        name: name.to_string(),
        kind,
        enabled,
        url: var("URL"),
        api_key: var("API_KEY"),
        batch_size,
    })
}

fn parse_optional<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(Some(
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}", key))?,
        )),
        _ => Ok(None),
    }
}
