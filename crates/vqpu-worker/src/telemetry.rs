//! Tracing subscriber setup.
//!
//! - Console output (development)
//! - JSON structured logging (cluster runs, one object per line)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::LoggingConfig;
use crate::error::{WorkerError, WorkerResult};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console output.
    Console,
    /// JSON structured logging.
    Json,
}

impl LogFormat {
    /// Parse a configured format name; anything but `json` is console.
    pub fn from_name(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            _ => LogFormat::Console,
        }
    }
}

/// Filter directive for a `-v` count; zero keeps the configured level.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes over when `level` is not a valid filter.
pub fn init_tracing(logging: &LoggingConfig, verbose: u8) -> WorkerResult<()> {
    let level = level_for_verbosity(verbose, &logging.level);
    let env_filter = EnvFilter::try_new(&level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout carries result documents.
    let fmt_layer = match LogFormat::from_name(&logging.format) {
        LogFormat::Console => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| WorkerError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::from_name("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("console"), LogFormat::Console);
        assert_eq!(LogFormat::from_name("pretty"), LogFormat::Console);
    }

    #[test]
    fn test_verbosity_overrides_level() {
        assert_eq!(level_for_verbosity(0, "warn"), "warn");
        assert_eq!(level_for_verbosity(1, "warn"), "info");
        assert_eq!(level_for_verbosity(2, "warn"), "debug");
        assert_eq!(level_for_verbosity(5, "warn"), "trace");
    }
}
