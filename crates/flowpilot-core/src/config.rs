//! Engine-wide configuration, loaded the way `Registry::load_directory`
//! loads resource directories elsewhere in this workspace: a top-level
//! struct with sane defaults, overridable from a YAML file or environment
//! variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Runner worker pool size; default = CPU count * 4 per §5.
    pub worker_count: usize,
    /// Bounded work queue depth before back-pressure kicks in.
    pub queue_capacity: usize,
    /// Lease window a running execution has to leave `pending` before the
    /// watchdog returns it to the queue.
    pub lease_window_secs: u64,
    pub default_max_retries: u32,
    pub default_execution_timeout_secs: i64,
    /// Base for the exponential-backoff-with-jitter retry delay.
    pub retry_backoff_base_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus_heuristic() * 4,
            queue_capacity: 1024,
            lease_window_secs: 30,
            default_max_retries: crate::execution::DEFAULT_MAX_RETRIES,
            default_execution_timeout_secs: crate::execution::DEFAULT_EXECUTION_TIMEOUT_SECS,
            retry_backoff_base_secs: 60,
        }
    }
}

fn num_cpus_heuristic() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Bounded parallel fan-out for simultaneously-ready nodes within one
    /// execution.
    pub max_parallel_fanout: usize,
    /// Grace period a running handler has to honor cancellation before its
    /// step is force-marked `failed(interrupted)`.
    pub cancellation_grace_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel_fanout: 4,
            cancellation_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: crate::cache::DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub execution_log_ttl_days: i64,
    pub audit_log_ttl_days: i64,
    /// Most-recent-K workflow versions kept; older ones are GC-eligible,
    /// `current_version` is always exempt.
    pub keep_versions: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            execution_log_ttl_days: 30,
            audit_log_ttl_days: 365,
            keep_versions: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// How often the cron scanner ticks; must be <= 60s per §4.3.
    pub scan_interval_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { scan_interval_secs: 30 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub runner: RunnerConfig,
    pub cache: CacheConfig,
    pub retention: RetentionConfig,
    pub trigger: TriggerConfig,
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::internal(format!("failed to read config file: {e}")))?;
        serde_yaml::from_str(&raw).map_err(|e| Error::validation(format!("invalid config yaml: {e}")))
    }

    /// Overlays a handful of environment variables onto whatever was loaded
    /// from file (or the defaults), matching the precedence the workspace's
    /// other `from_env` loaders use: env wins.
    pub fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("FLOWPILOT_WORKER_COUNT") {
            if let Ok(n) = v.parse() {
                self.scheduler.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("FLOWPILOT_MAX_PARALLEL_FANOUT") {
            if let Ok(n) = v.parse() {
                self.runner.max_parallel_fanout = n;
            }
        }
        if let Ok(v) = std::env::var("FLOWPILOT_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.default_ttl_secs = n;
            }
        }
        self
    }

    pub fn lease_window(&self) -> Duration {
        Duration::from_secs(self.scheduler.lease_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.scheduler.worker_count > 0);
        assert_eq!(cfg.runner.max_parallel_fanout, 4);
        assert_eq!(cfg.trigger.scan_interval_secs <= 60, true);
    }

    #[test]
    fn from_file_parses_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "scheduler:\n  worker_count: 16\n").unwrap();
        let cfg = EngineConfig::from_file(&path).unwrap();
        assert_eq!(cfg.scheduler.worker_count, 16);
        assert_eq!(cfg.runner.max_parallel_fanout, 4);
    }

    #[test]
    fn env_overlay_wins() {
        std::env::set_var("FLOWPILOT_MAX_PARALLEL_FANOUT", "9");
        let cfg = EngineConfig::default().from_env();
        assert_eq!(cfg.runner.max_parallel_fanout, 9);
        std::env::remove_var("FLOWPILOT_MAX_PARALLEL_FANOUT");
    }
}
