use super::errors::{DispatchError, DispatchResult};
use std::{env, str::FromStr};
use tokio::time::Duration;

pub const ENV_POOL_SIZE: &str = "LEAST_LOADED_POOL_SIZE";
pub const ENV_PRODUCERS: &str = "LEAST_LOADED_PRODUCERS";
pub const ENV_TASK_TIMEOUT_MS: &str = "LEAST_LOADED_TASK_TIMEOUT_MS";

/// Startup configuration of the pool. Fixed once the pool is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of workers.
    pub pool_size: usize,
    /// Number of independent producers driving the pool. Only the workload
    /// generator reads this.
    pub producer_count: usize,
    /// Deadline applied to every task handle, none by default.
    pub task_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            producer_count: 100,
            task_timeout: None,
        }
    }
}

impl Config {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Default::default()
        }
    }

    /// Ten workers fed by a hundred producers.
    pub fn demo() -> Self {
        Self {
            pool_size: 10,
            producer_count: 100,
            task_timeout: None,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_producer_count(mut self, producer_count: usize) -> Self {
        self.producer_count = producer_count;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Applies overrides from the process environment.
    pub fn with_env_overrides(self) -> DispatchResult<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup. Unset keys keep the
    /// current value; unparsable values are an error.
    pub fn with_overrides<F>(mut self, lookup: F) -> DispatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var::<usize>(&lookup, ENV_POOL_SIZE)? {
            self.pool_size = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, ENV_PRODUCERS)? {
            self.producer_count = v;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TASK_TIMEOUT_MS)? {
            self.task_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        Ok(self)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.pool_size == 0 {
            return Err(DispatchError::InvalidConfig(
                "pool_size must be at least 1".into(),
            ));
        }
        if self.task_timeout == Some(Duration::ZERO) {
            return Err(DispatchError::InvalidConfig(
                "task_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> DispatchResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DispatchError::InvalidConfig(format!("{key}={raw:?} is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_uses_cpu_count() {
        let config = Config::default();
        assert_eq!(config.pool_size, num_cpus::get());
        assert_eq!(config.producer_count, 100);
        assert!(config.task_timeout.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn builders() {
        let config = Config::new(3)
            .with_producer_count(8)
            .with_task_timeout(Duration::from_millis(250));
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.producer_count, 8);
        assert_eq!(config.task_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn overrides_apply() {
        let config = Config::demo()
            .with_overrides(lookup(&[
                (ENV_POOL_SIZE, "4"),
                (ENV_PRODUCERS, " 12 "),
                (ENV_TASK_TIMEOUT_MS, "1500"),
            ]))
            .unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.producer_count, 12);
        assert_eq!(config.task_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn zero_timeout_override_disables_timeout() {
        let config = Config::demo()
            .with_task_timeout(Duration::from_secs(1))
            .with_overrides(lookup(&[(ENV_TASK_TIMEOUT_MS, "0")]))
            .unwrap();
        assert_eq!(config.task_timeout, None);
    }

    #[test]
    fn bad_override_is_rejected() {
        let err = Config::demo()
            .with_overrides(lookup(&[(ENV_POOL_SIZE, "many")]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig(msg) if msg.contains(ENV_POOL_SIZE)));
    }

    #[test]
    fn zero_pool_is_invalid() {
        assert!(Config::new(0).validate().is_err());
    }
}
