//! Registry configuration.

use anyhow::{anyhow, Context, Result};
use samgr_common::duration_serde;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Registry configuration, loaded from YAML.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Capacity of the ability map and of the on-demand map.
    #[serde(default = "default_max_services")]
    pub max_services: usize,

    /// Per caller process cap on subscriptions, and separately on
    /// outstanding load callbacks.
    #[serde(default = "default_max_subscribe_count")]
    pub max_subscribe_count: usize,

    /// How long a local load waits for the ability to publish.
    #[serde(default = "default_load_timeout", with = "duration_serde")]
    pub load_timeout: Duration,

    /// Bound on a single listener or callback delivery.
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub notify_timeout: Duration,

    /// Worker count of the cross-device load pool.
    #[serde(default = "default_load_pool_size")]
    pub load_pool_size: usize,

    #[serde(default = "default_pool_queue_capacity")]
    pub pool_queue_capacity: usize,

    /// Period of the caller/ability frequency report.
    #[serde(default = "default_frequency_report_interval", with = "duration_serde")]
    pub frequency_report_interval: Duration,

    /// Delay before on-demand abilities are preloaded.
    #[serde(default = "default_ondemand_perf_delay", with = "duration_serde")]
    pub ondemand_perf_delay: Duration,

    /// Load every on-demand ability once `ondemand_perf_delay` has passed.
    #[serde(default)]
    pub preload_on_demand: bool,

    /// Profile documents to load at startup.
    #[serde(default)]
    pub profile_paths: Vec<String>,

    /// Command used to launch a hosting process; `{process}` is replaced by
    /// the process name and `{ability}` by the id it is launched for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher_command: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_services() -> usize {
    1000
}

fn default_max_subscribe_count() -> usize {
    256
}

fn default_load_timeout() -> Duration {
    Duration::from_millis(4000)
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_load_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_pool_queue_capacity() -> usize {
    samgr_common::pool::DEFAULT_QUEUE_CAPACITY
}

fn default_frequency_report_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_ondemand_perf_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_services: default_max_services(),
            max_subscribe_count: default_max_subscribe_count(),
            load_timeout: default_load_timeout(),
            notify_timeout: default_notify_timeout(),
            load_pool_size: default_load_pool_size(),
            pool_queue_capacity: default_pool_queue_capacity(),
            frequency_report_interval: default_frequency_report_interval(),
            ondemand_perf_delay: default_ondemand_perf_delay(),
            preload_on_demand: false,
            profile_paths: Vec::new(),
            launcher_command: None,
            log_level: default_log_level(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: RegistryConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_services == 0 {
            return Err(anyhow!("max_services must be greater than 0"));
        }
        if self.max_subscribe_count == 0 {
            return Err(anyhow!("max_subscribe_count must be greater than 0"));
        }
        if self.load_timeout.is_zero() {
            return Err(anyhow!("load_timeout must be greater than 0"));
        }
        if self.notify_timeout.is_zero() {
            return Err(anyhow!("notify_timeout must be greater than 0"));
        }
        if self.load_pool_size == 0 || self.pool_queue_capacity == 0 {
            return Err(anyhow!("load pool size and queue capacity must be greater than 0"));
        }
        if self.frequency_report_interval.is_zero() {
            return Err(anyhow!("frequency_report_interval must be greater than 0"));
        }
        if let Some(command) = &self.launcher_command {
            if command.trim().is_empty() {
                return Err(anyhow!("launcher_command must not be empty when set"));
            }
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(anyhow!(
                "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
                self.log_level
            )),
        }
    }
}
