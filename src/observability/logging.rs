//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format: {other}"))),
        }
    }
}

/// Validated logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file; logs go to stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: "chronograph=info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Validates the logging section of a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown format or a malformed
    /// filter directive.
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self> {
        let config = Self {
            format: settings.format.parse()?,
            filter: settings.filter.clone(),
            file: settings.file.clone(),
        };
        config.env_filter()?;
        Ok(config)
    }

    /// Builds the filter layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed filter directive.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_new(&self.filter)
            .map_err(|e| Error::InvalidInput(format!("invalid log filter '{}': {e}", self.filter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("pretty", LogFormat::Pretty ; "pretty")]
    #[test_case("Compact", LogFormat::Compact ; "compact mixed case")]
    #[test_case(" json ", LogFormat::Json ; "json padded")]
    fn test_parse_format(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            format: "json".to_string(),
            filter: "chronograph=debug".to_string(),
            file: None,
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "chronograph=debug");
    }

    #[test]
    fn test_from_settings_rejects_unknown_format() {
        let settings = LoggingSettings {
            format: "xml".to_string(),
            ..LoggingSettings::default()
        };
        assert!(matches!(
            LoggingConfig::from_settings(&settings),
            Err(Error::InvalidInput(_))
        ));
    }
}
