//! pgharvest - Periodic PostgreSQL Statistics Collection
//!
//! This crate provides the core functionality for the pgharvest daemon: it
//! connects to a set of independently-configured PostgreSQL servers, runs a
//! cron-scheduled statistics collection pass across all of them, and
//! supports live reconfiguration (SIGHUP) and graceful drain on termination.
//!
//! # Architecture
//!
//! - **Config**: YAML configuration for targets and schedule overrides
//! - **Schedule**: named cron intervals resolved into cancellable fire loops
//! - **Connect**: per-target connection establishment with TLS fallback
//! - **Collect**: the fan-out collection pass and the delivery seam
//! - **Daemon**: the lifecycle state machine (load, arm, reload, drain)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pgharvest::{Daemon, LogSink, PostgresDriver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let daemon = Daemon::new(PostgresDriver, Arc::new(LogSink), "pgharvest.yaml");
//!     let control = pgharvest::spawn_listener().expect("failed to install signal handlers");
//!     daemon.run(control).await;
//! }
//! ```

pub mod collect;
pub mod config;
pub mod connect;
pub mod daemon;
pub mod schedule;

pub use collect::{DryRunSink, LogSink, Sink, Target, TargetSnapshot};
pub use config::{AppConfig, ConfigError, SslMode, TargetConfig};
pub use connect::{ConnectError, Driver, PostgresDriver, WireSsl, establish};
pub use daemon::{ControlSignal, Daemon, DaemonError, InFlight, spawn_listener};
pub use schedule::{CronTrigger, ScheduleConfig, ScheduleHandle, Trigger, resolve};
