//! Structured logging via `tracing`.
//!
//! The library only emits events (`debug!` for solver/search progress, `info!`
//! for pipeline steps, `warn!` for diagnostics). The binary installs a global
//! subscriber once at start-up through [`init_logging`].
//!
//! Filter precedence: `RUST_LOG` (possibly loaded from `.env`), then the
//! configured level.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// Machine-readable.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include source location (file:line).
    pub source_location: bool,
    /// Module filter (e.g. `"psd_fit::fit=debug"`), overrides `level`.
    pub filter: Option<String>,
}

impl LogConfig {
    fn env_filter(&self) -> EnvFilter {
        if let Some(custom) = &self.filter {
            return EnvFilter::try_new(custom).unwrap_or_else(|_| EnvFilter::new(self.level.to_string()));
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Install the global subscriber.
///
/// Events are written to stderr so that reports on stdout stay clean.
/// Returns `false` when a subscriber was already installed (tests, embedding
/// applications); that one is kept and the refusal is logged at debug level.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = config.env_filter();

    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            ),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            ),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_file(config.source_location)
                    .with_line_number(config.source_location),
            ),
        ),
    };

    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(%err, "keeping the installed tracing subscriber");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_display_matches_filter_syntax() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::default().to_string(), "warn");
    }

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        let config = LogConfig {
            filter: Some("psd_fit=debug".to_string()),
            ..Default::default()
        };
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
