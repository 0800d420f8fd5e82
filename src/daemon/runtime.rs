//! The daemon state machine.
//!
//! ```text
//! Init ──load + connect + arm──► Running(generation)
//!  ▲  └─(config error: log, await signal)              │
//!  │                                                   │
//!  └────────────── Reload: retire old generation ──────┤
//!                                                      │ Terminate
//!                                                      ▼
//!                                   Draining ──wait for passes──► Stopped
//! ```
//!
//! Exactly one generation is active at a time. A reload retires the old
//! generation completely (schedule loop exited, connections closed) before
//! the new one is built, so two generations never run the same group
//! concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::collect::{self, Sink, Target};
use crate::config::{AppConfig, ConfigError, TargetConfig};
use crate::connect::{self, Driver};
use crate::schedule::{self, ScheduleError, ScheduleGroup, ScheduleHandle};

use super::inflight::InFlight;
use super::signals::ControlSignal;

/// The schedule group the daemon arms.
pub const STATS_GROUP: &str = "stats";

/// Fatal errors for one configuration load attempt.
///
/// In continuous mode these keep the daemon in its initial state awaiting an
/// external reload or termination; in one-shot mode they abort the run.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be read or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Schedule groups could not be resolved.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The schedule resolves but does not define the group the daemon arms.
    #[error("schedule defines no '{0}' group")]
    MissingGroup(&'static str),
}

/// One complete set of resolved schedule state and live connections, active
/// until replaced wholesale by a reload.
struct Generation<C> {
    handle: ScheduleHandle,
    targets: Arc<Vec<Target<C>>>,
}

enum State<C> {
    Init,
    Running(Generation<C>),
    Draining,
    Stopped,
}

/// The collection daemon.
///
/// Generic over the [`Driver`] so the whole lifecycle is testable without a
/// server; production uses [`PostgresDriver`](crate::connect::PostgresDriver).
pub struct Daemon<D: Driver> {
    driver: Arc<D>,
    sink: Arc<dyn Sink>,
    config_path: PathBuf,
    in_flight: InFlight,
}

impl<D: Driver> Daemon<D> {
    /// Create a daemon reading its configuration from `config_path`.
    pub fn new(driver: D, sink: Arc<dyn Sink>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            driver: Arc::new(driver),
            sink,
            config_path: config_path.into(),
            in_flight: InFlight::new(),
        }
    }

    /// Path the daemon (re)loads its configuration from.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Run continuously until a terminate signal arrives (or the control
    /// channel closes), then drain in-flight work and return.
    pub async fn run(&self, mut control: mpsc::Receiver<ControlSignal>) {
        let mut state = State::Init;
        loop {
            state = match state {
                State::Init => match self.start_generation().await {
                    Ok(generation) => {
                        tracing::info!(
                            targets = generation.targets.len(),
                            "generation started"
                        );
                        State::Running(generation)
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "could not start generation, awaiting reload or termination"
                        );
                        match control.recv().await {
                            Some(ControlSignal::Reload) => State::Init,
                            Some(ControlSignal::Terminate) | None => State::Draining,
                        }
                    }
                },
                State::Running(generation) => match control.recv().await {
                    Some(ControlSignal::Reload) => {
                        tracing::info!("reloading configuration");
                        self.retire(generation).await;
                        State::Init
                    }
                    Some(ControlSignal::Terminate) | None => {
                        tracing::info!("terminating");
                        self.retire(generation).await;
                        State::Draining
                    }
                },
                State::Draining => {
                    let passes = self.in_flight.current();
                    if passes > 0 {
                        tracing::info!(passes, "waiting for in-flight collection to finish");
                    }
                    self.in_flight.wait_idle().await;
                    State::Stopped
                }
                State::Stopped => break,
            };
        }
        tracing::info!("daemon stopped");
    }

    /// Validate configuration, connect, execute exactly one collection pass,
    /// and tear down. Nothing is armed; backs the `--test`/`--dry-run` flags.
    pub async fn run_once(&self) -> Result<(), DaemonError> {
        let config = AppConfig::load(&self.config_path)?;
        let groups = schedule::resolve(&config.schedule)?;
        if !groups.contains_key(STATS_GROUP) {
            return Err(DaemonError::MissingGroup(STATS_GROUP));
        }

        let targets = self.connect_targets(&config.targets).await;
        {
            let _pass = self.in_flight.begin();
            collect::run_pass(self.driver.as_ref(), &targets, self.sink.as_ref()).await;
        }
        for target in &targets {
            self.driver.close(&target.conn).await;
        }
        Ok(())
    }

    /// Load configuration, resolve the schedule, connect all targets, and
    /// arm the stats group.
    async fn start_generation(&self) -> Result<Generation<D::Conn>, DaemonError> {
        let config = AppConfig::load(&self.config_path)?;
        let mut groups = schedule::resolve(&config.schedule)?;
        let stats = groups
            .remove(STATS_GROUP)
            .ok_or(DaemonError::MissingGroup(STATS_GROUP))?;
        if !groups.is_empty() {
            tracing::debug!(
                unarmed = groups.len(),
                "schedule defines additional groups with no bound task"
            );
        }

        let targets = Arc::new(self.connect_targets(&config.targets).await);
        let handle = self.arm(stats, Arc::clone(&targets));

        Ok(Generation { handle, targets })
    }

    /// Attempt to connect every configured target. Failures are logged with
    /// the target's identity and the target is excluded from this
    /// generation; the remainder proceeds even if it is empty.
    async fn connect_targets(&self, configs: &[TargetConfig]) -> Vec<Target<D::Conn>> {
        let mut targets = Vec::with_capacity(configs.len());
        for config in configs {
            match connect::establish(self.driver.as_ref(), config).await {
                Ok(conn) => {
                    tracing::debug!(target = %config.name, "connection established");
                    targets.push(Target {
                        config: config.clone(),
                        conn,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        target = %config.name,
                        error = %e,
                        "failed to connect, excluding target from this generation"
                    );
                }
            }
        }
        if targets.is_empty() {
            tracing::warn!("no reachable targets, collection passes will be empty until reload");
        }
        targets
    }

    fn arm(&self, group: ScheduleGroup, targets: Arc<Vec<Target<D::Conn>>>) -> ScheduleHandle {
        tracing::info!(
            group = %group.name,
            method = %group.method,
            targets = targets.len(),
            "schedule armed"
        );

        let driver = Arc::clone(&self.driver);
        let sink = Arc::clone(&self.sink);
        let in_flight = self.in_flight.clone();

        schedule::spawn(group.name, group.trigger, move || {
            let driver = Arc::clone(&driver);
            let sink = Arc::clone(&sink);
            let targets = Arc::clone(&targets);
            let in_flight = in_flight.clone();
            async move {
                let _pass = in_flight.begin();
                collect::run_pass(driver.as_ref(), &targets, sink.as_ref()).await;
            }
        })
    }

    /// Retire a generation: stop its schedule loop and only then close its
    /// connections, so no connection is torn down while a pass of this
    /// generation could still be using it.
    async fn retire(&self, generation: Generation<D::Conn>) {
        generation.handle.cancel().await;
        for target in generation.targets.iter() {
            self.driver.close(&target.conn).await;
        }
        tracing::debug!("generation retired");
    }
}
