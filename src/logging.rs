//! Tracing initialisation.
//!
//! `RUST_LOG` takes precedence over the configured level, so
//! `RUST_LOG=ad_roundtrip::pv=trace` turns on per-write logging without
//! touching the config file.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human readable
    #[default]
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl FromStr for LogFormat {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(HarnessError::Logging(format!("unknown log format '{other}'"))),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Default filter directive, e.g. `info`
    pub level: String,
    /// Output layout
    pub format: LogFormat,
    /// Colourise output
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Settings from the `[application]` section
    pub fn from_harness(config: &HarnessConfig) -> Result<Self, HarnessError> {
        Ok(Self {
            level: config.application.log_level.clone(),
            format: config.application.log_format.parse()?,
            with_ansi: true,
        })
    }

    fn filter(&self) -> Result<EnvFilter, HarnessError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.level)
                .map_err(|e| HarnessError::Logging(format!("invalid level '{}': {e}", self.level))),
        }
    }
}

/// Install the global subscriber.
///
/// Calling this again after a subscriber is installed is a no-op.
pub fn init(config: &TracingConfig) -> Result<(), HarnessError> {
    let filter = config.filter()?;
    let builder = fmt().with_env_filter(filter).with_ansi(config.with_ansi);

    // try_init fails only when a global subscriber already exists.
    let _ = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    Ok(())
}

/// Install the global subscriber from harness configuration
pub fn init_from_config(config: &HarnessConfig) -> Result<(), HarnessError> {
    init(&TracingConfig::from_harness(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_harness_config() {
        let mut harness = HarnessConfig::default();
        harness.application.log_level = "debug".to_string();
        harness.application.log_format = "compact".to_string();
        let config = TracingConfig::from_harness(&harness).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TracingConfig {
            with_ansi: false,
            ..TracingConfig::default()
        };
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }
}
