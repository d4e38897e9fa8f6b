//! Per-process manager configuration.

use anyhow::{anyhow, Context, Result};
use samgr_common::{duration_serde, AbilityId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Configuration of a [`LocalAbilityManager`](crate::LocalAbilityManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalManagerConfig {
    /// Workers starting boot-phase abilities.
    #[serde(default = "default_boot_pool_size")]
    pub boot_pool_size: usize,

    /// Workers serving start directives from the registry.
    #[serde(default = "default_ondemand_pool_size")]
    pub ondemand_pool_size: usize,

    #[serde(default = "default_pool_queue_capacity")]
    pub pool_queue_capacity: usize,

    /// How often an on-demand start looks for its ability to appear locally.
    #[serde(default = "default_ondemand_retry_times")]
    pub ondemand_retry_times: u32,

    #[serde(default = "default_ondemand_retry_interval", with = "duration_serde")]
    pub ondemand_retry_interval: Duration,

    /// How often process registration is retried while the registry is
    /// unreachable.
    #[serde(default = "default_samgr_retry_times")]
    pub samgr_retry_times: u32,

    #[serde(default = "default_samgr_retry_interval", with = "duration_serde")]
    pub samgr_retry_interval: Duration,

    /// Upper bound on one boot phase. The next phase starts when it elapses.
    #[serde(default = "default_max_phase_wait", with = "duration_serde")]
    pub max_phase_wait: Duration,

    /// Poll period while an ability waits for its dependencies.
    #[serde(default = "default_dependency_check_interval", with = "duration_serde")]
    pub dependency_check_interval: Duration,

    /// Process name → ability ids allowed in it. An empty map allows
    /// everything; otherwise a process missing from the map hosts nothing.
    #[serde(default)]
    pub trust_list: HashMap<String, Vec<AbilityId>>,
}

fn default_boot_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_ondemand_pool_size() -> usize {
    4
}

fn default_pool_queue_capacity() -> usize {
    samgr_common::pool::DEFAULT_QUEUE_CAPACITY
}

fn default_ondemand_retry_times() -> u32 {
    10
}

fn default_ondemand_retry_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_samgr_retry_times() -> u32 {
    50
}

fn default_samgr_retry_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_max_phase_wait() -> Duration {
    Duration::from_secs(100)
}

fn default_dependency_check_interval() -> Duration {
    Duration::from_millis(50)
}

impl Default for LocalManagerConfig {
    fn default() -> Self {
        Self {
            boot_pool_size: default_boot_pool_size(),
            ondemand_pool_size: default_ondemand_pool_size(),
            pool_queue_capacity: default_pool_queue_capacity(),
            ondemand_retry_times: default_ondemand_retry_times(),
            ondemand_retry_interval: default_ondemand_retry_interval(),
            samgr_retry_times: default_samgr_retry_times(),
            samgr_retry_interval: default_samgr_retry_interval(),
            max_phase_wait: default_max_phase_wait(),
            dependency_check_interval: default_dependency_check_interval(),
            trust_list: HashMap::new(),
        }
    }
}

impl LocalManagerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: LocalManagerConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.boot_pool_size == 0 || self.ondemand_pool_size == 0 {
            return Err(anyhow!("pool sizes must be greater than 0"));
        }
        if self.pool_queue_capacity == 0 {
            return Err(anyhow!("pool_queue_capacity must be greater than 0"));
        }
        if self.max_phase_wait.is_zero() {
            return Err(anyhow!("max_phase_wait must be greater than 0"));
        }
        if self.dependency_check_interval.is_zero() {
            return Err(anyhow!("dependency_check_interval must be greater than 0"));
        }
        for process in self.trust_list.keys() {
            samgr_common::validate_process_name(process)
                .map_err(|e| anyhow!("trust_list: {}", e))?;
        }
        Ok(())
    }

    /// Whether `process` may host `id`.
    pub fn is_trusted(&self, process: &str, id: AbilityId) -> bool {
        if self.trust_list.is_empty() {
            return true;
        }
        self.trust_list
            .get(process)
            .map_or(false, |ids| ids.contains(&id))
    }
}
