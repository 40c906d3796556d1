//! Configuration management.
//!
//! Configuration is assembled from defaults, an optional TOML file and
//! environment overrides, in that order.
//!
//! ```toml
//! strict_endpoints = true
//! version_counter = "store"
//!
//! [logging]
//! format = "json"
//! filter = "chronograph=debug"
//! file = "/var/log/chronograph.log"
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CHRONOGRAPH_STRICT_ENDPOINTS` | `strict_endpoints` |
//! | `CHRONOGRAPH_VERSION_COUNTER` | `version_counter` |
//! | `CHRONOGRAPH_LOG_FORMAT` | `logging.format` |
//! | `CHRONOGRAPH_LOG` | `logging.filter` |

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable overriding `strict_endpoints`.
pub const ENV_STRICT_ENDPOINTS: &str = "CHRONOGRAPH_STRICT_ENDPOINTS";
/// Environment variable overriding `version_counter`.
pub const ENV_VERSION_COUNTER: &str = "CHRONOGRAPH_VERSION_COUNTER";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "CHRONOGRAPH_LOG_FORMAT";
/// Environment variable overriding `logging.filter`.
pub const ENV_LOG_FILTER: &str = "CHRONOGRAPH_LOG";

/// Main configuration for chronograph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChronographConfig {
    /// Whether relationship traversal also requires the far endpoint to
    /// exist at the context version.
    pub strict_endpoints: bool,
    /// Which version counter backs the versioning handler.
    pub version_counter: CounterKind,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Available version counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterKind {
    /// Counter persisted on the store's reference node.
    #[default]
    Store,
    /// In-process atomic counter.
    Atomic,
}

impl CounterKind {
    /// Returns the counter kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Atomic => "atomic",
        }
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "store" | "persistent" => Ok(Self::Store),
            "atomic" | "memory" => Ok(Self::Atomic),
            other => Err(Error::InvalidInput(format!("unknown version counter: {other}"))),
        }
    }
}

/// Logging section.
///
/// The format is kept as text and validated when logging is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format: "pretty", "compact" or "json".
    pub format: String,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file; logs go to stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            filter: "chronograph=info".to_string(),
            file: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Strict endpoint checks.
    pub strict_endpoints: Option<bool>,
    /// Version counter kind.
    pub version_counter: Option<String>,
    /// Logging configuration.
    pub logging: Option<ConfigFileLogging>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for ChronographConfig {
    fn default() -> Self {
        Self {
            strict_endpoints: false,
            version_counter: CounterKind::Store,
            logging: LoggingSettings::default(),
        }
    }
}

impl ChronographConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// unknown counter kind.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/chronograph/` on macOS)
    /// 2. XDG config dir (`~/.config/chronograph/` for Unix compatibility)
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs
            .config_dir()
            .join("chronograph")
            .join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("chronograph")
            .join("config.toml");

        for candidate in [platform_config, xdg_config] {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "ignoring config file");
                },
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `ChronographConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(strict) = file.strict_endpoints {
            config.strict_endpoints = strict;
        }
        if let Some(counter) = file.version_counter {
            config.version_counter = counter.parse()?;
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = format;
            }
            if let Some(filter) = logging.filter {
                config.logging.filter = filter;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        Ok(config)
    }

    /// Applies `CHRONOGRAPH_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed values.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed values.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_STRICT_ENDPOINTS) {
            self.strict_endpoints = parse_bool(ENV_STRICT_ENDPOINTS, &value)?;
        }
        if let Some(value) = lookup(ENV_VERSION_COUNTER) {
            self.version_counter = value.parse()?;
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = value;
        }
        if let Some(value) = lookup(ENV_LOG_FILTER) {
            self.logging.filter = value;
        }
        Ok(self)
    }

    /// Sets strict endpoint checks.
    #[must_use]
    pub const fn with_strict_endpoints(mut self, strict: bool) -> Self {
        self.strict_endpoints = strict;
        self
    }

    /// Sets the version counter kind.
    #[must_use]
    pub const fn with_version_counter(mut self, kind: CounterKind) -> Self {
        self.version_counter = kind;
        self
    }

    /// Sets the logging section.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingSettings) -> Self {
        self.logging = logging;
        self
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidInput(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
