//! Logging setup shared by the Botcast binaries
//!
//! All output goes to stderr so stdout stays free for command results.
//! `BOTCAST_LOG_FORMAT` selects `text`, `json` or `pretty`, and
//! `BOTCAST_LOG_LEVEL` (or `RUST_LOG`) selects the filter.
//!
//! ```no_run
//! use libbotcast::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines, no colors
    Text,
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Build from `BOTCAST_LOG_FORMAT` / `BOTCAST_LOG_LEVEL`, defaulting to text at info
    pub fn from_env(verbose: bool) -> Self {
        let format = std::env::var("BOTCAST_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("BOTCAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self::new(format, level, verbose)
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber.
    ///
    /// Returns `false` if a subscriber was already installed (tests, embedding).
    pub fn init(&self) -> bool {
        let filter = self.filter();
        let result = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .try_init(),
        };
        result.is_ok()
    }
}

/// Initialize logging from the environment
pub fn init_default(verbose: bool) -> bool {
    LoggingConfig::from_env(verbose).init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let result = "xml".parse::<LogFormat>();
        assert!(result.unwrap_err().contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display_roundtrips_through_parse() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_reads_botcast_variables() {
        std::env::set_var("BOTCAST_LOG_FORMAT", "json");
        std::env::set_var("BOTCAST_LOG_LEVEL", "warn");

        let config = LoggingConfig::from_env(false);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");

        std::env::remove_var("BOTCAST_LOG_FORMAT");
        std::env::remove_var("BOTCAST_LOG_LEVEL");

        let config = LoggingConfig::from_env(true);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
        assert!(config.verbose);
    }
}
