//! Logging setup for the demo binary. The library itself only emits `tracing`
//! events and never installs a subscriber.
//!
//! `LEAST_LOADED_LOG` takes precedence over `RUST_LOG`; both accept the usual
//! `EnvFilter` directives. `LEAST_LOADED_LOG_FORMAT` selects `compact` or
//! `pretty` output.

use std::{env, str::FromStr};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_LOG: &str = "LEAST_LOADED_LOG";
pub const ENV_LOG_FORMAT: &str = "LEAST_LOADED_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" | "full" => Ok(Self::Pretty),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: compact, pretty",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Filter directives, overriding `level` when set.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(filter) = env::var(ENV_LOG)
            .ok()
            .or_else(|| env::var("RUST_LOG").ok())
        {
            self.filter = Some(filter);
        }
        if let Some(format) = env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|f| f.parse().ok())
        {
            self.format = format;
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(config: LogConfig) {
    let filter = config.env_filter();
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match config.format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
}
