//! Daemon lifecycle orchestration.
//!
//! [`Daemon`] is the state machine tying configuration loading, schedule
//! arming, live reload, and graceful drain together. [`InFlight`] counts
//! executing collection passes so shutdown can wait for them, and
//! [`spawn_listener`] wires OS signals into the daemon's control channel.

mod inflight;
mod runtime;
mod signals;

pub use inflight::{InFlight, PassGuard};
pub use runtime::{Daemon, DaemonError, STATS_GROUP};
pub use signals::{ControlSignal, spawn_listener};
