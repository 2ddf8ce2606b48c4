//! Logging setup for anchorsync
//!
//! Installs a `tracing` subscriber with an env filter and a human-readable
//! or JSON formatter. `RUST_LOG`, when set, takes precedence over the
//! configured level.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

use crate::config::LoggingConfig;

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub with_timestamp: bool,
    pub with_target: bool,
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Build from the `[logging]` section of the node config
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LoggingError> {
        Ok(Self {
            level: config.level.parse()?,
            with_timestamp: config.with_timestamp,
            with_target: config.with_target,
            json_format: config.json_format,
        })
    }
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging. Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.as_str()))
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(format_layer(&config))
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

fn format_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer().with_target(config.with_target);

    match (config.json_format, config.with_timestamp) {
        (true, true) => layer.json().boxed(),
        (true, false) => layer.json().without_time().boxed(),
        (false, true) => layer.boxed(),
        (false, false) => layer.without_time().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new(LogLevel::Debug)
            .with_timestamp(false)
            .with_target(false)
            .json_format(true);

        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.with_timestamp);
        assert!(!config.with_target);
        assert!(config.json_format);
    }

    #[test]
    fn test_from_node_config() {
        let mut section = LoggingConfig::default();
        section.level = "warn".to_string();
        section.json_format = true;

        let config = LogConfig::from_config(&section).unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.json_format);

        section.level = "shouty".to_string();
        assert!(LogConfig::from_config(&section).is_err());
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever test installs first wins; a later attempt must error
        let _ = init_logging_with_config(LogConfig::new(LogLevel::Error).with_timestamp(false));
        assert!(init_logging().is_err());
    }
}
