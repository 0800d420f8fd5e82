//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::ScheduleConfig;

// =============================================================================
// Constants
// =============================================================================

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read configuration file '{path}': {source}")]
    Read {
        /// Path as given on the command line.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for this configuration shape.
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The configuration parsed but holds invalid values.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Target Configuration
// =============================================================================

/// Requested transport security mode for a target.
///
/// `Prefer` is a policy mode: the wire protocol only knows encrypted or
/// plaintext, so the connection layer resolves it by trying TLS first and
/// falling back to plaintext when the server has TLS disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Never use TLS.
    Disable,
    /// Use TLS if the server supports it, plaintext otherwise (default).
    #[default]
    Prefer,
    /// Require TLS; fail if the server has it disabled.
    Require,
}

/// Connection parameters for one monitored PostgreSQL server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique name identifying this target in logs and delivered data.
    pub name: String,
    /// Server host name or IP address.
    pub host: String,
    /// Server port (default: 5432).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database to connect to.
    pub database: String,
    /// Role to connect as.
    pub username: String,
    /// Password (default: empty). Supports `${VAR}` references in the
    /// config file.
    #[serde(default)]
    pub password: String,
    /// Transport security mode (default: prefer).
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Connection timeout (default: 10s).
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl TargetConfig {
    /// Create a target configuration with defaults for the optional fields.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            database: database.into(),
            username: username.into(),
            password: String::new(),
            ssl_mode: SslMode::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the transport security mode.
    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Named intervals and schedule groups. Falls back to the built-in
    /// schedule when the section is absent.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Monitored servers. May be empty; collection passes then run against
    /// nothing until a reload adds targets.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references anywhere in the file are
    /// substituted from the process environment before parsing, so secrets
    /// like passwords can stay out of the file itself.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&substitute_env(&raw))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();

        for target in &self.targets {
            if target.name.is_empty() {
                return Err(ConfigError::Invalid(
                    "target name must not be empty".to_string(),
                ));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target name: '{}'",
                    target.name
                )));
            }
            if target.host.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': host must not be empty",
                    target.name
                )));
            }
            if target.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': port must be non-zero",
                    target.name
                )));
            }
            if target.database.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': database must not be empty",
                    target.name
                )));
            }
            if target.username.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target '{}': username must not be empty",
                    target.name
                )));
            }
        }

        Ok(())
    }
}

/// Replace `${VAR}` and `${VAR:-default}` references with values from the
/// process environment. An unset variable without a default becomes the
/// empty string.
fn substitute_env(raw: &str) -> String {
    let reference =
        regex::Regex::new(r"\$\{(?<var>[A-Za-z_][A-Za-z0-9_]*)(?::-(?<fallback>[^}]*))?\}")
            .expect("env reference pattern is valid");

    reference
        .replace_all(raw, |caps: &regex::Captures| {
            match std::env::var(&caps["var"]) {
                Ok(value) => value,
                Err(_) => caps
                    .name("fallback")
                    .map_or_else(String::new, |m| m.as_str().to_string()),
            }
        })
        .into_owned()
}
