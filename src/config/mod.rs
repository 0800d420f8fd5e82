//! Configuration module for the pgharvest daemon.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Target settings (connection parameters, TLS mode)
//! - Schedule overrides (named intervals and groups)

mod app;

pub use app::{AppConfig, ConfigError, SslMode, TargetConfig};

// Re-export constants
pub use app::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT};
