//! Scheduler configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables (`SCHEDULER__WORKER_COUNT=8`, etc.).

use serde::Deserialize;

/// Scheduler-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Number of queue-consuming workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Minimum interval between throttled progress writes, in
    /// milliseconds. The settlement write ignores this.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Delivery attempts before the queue drops a failing job.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// NATS server URL. When absent, in-memory backends are used.
    #[serde(default)]
    pub nats_url: Option<String>,
}

fn default_worker_count() -> usize {
    4
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_max_delivery_attempts() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            progress_interval_ms: default_progress_interval_ms(),
            max_delivery_attempts: default_max_delivery_attempts(),
            nats_url: None,
        }
    }
}

impl SchedulerConfig {
    /// Loads configuration from `SCHEDULER__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a provided value cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("SCHEDULER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// The progress throttle interval as a `Duration`.
    #[must_use]
    pub fn progress_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_has_sensible_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.progress_interval_ms, 1000);
        assert_eq!(config.max_delivery_attempts, 3);
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn progress_interval_converts_to_duration() {
        let config = SchedulerConfig {
            progress_interval_ms: 250,
            ..Default::default()
        };
        assert_eq!(
            config.progress_interval(),
            std::time::Duration::from_millis(250)
        );
    }
}
