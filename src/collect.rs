//! Collection pass and delivery seam.
//!
//! A *pass* is one fan-out over every live target in the current generation:
//! collect statistics from each, deliver each result through the [`Sink`].
//! Targets are processed sequentially and in isolation; one target's failure
//! never stops the remainder of the pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;

use crate::config::TargetConfig;
use crate::connect::Driver;

/// Collection errors, per target and per pass.
///
/// Never retried within a pass; the next scheduled pass is the retry
/// mechanism.
#[derive(Debug, Error)]
pub enum CollectError {
    /// A statistics query failed.
    #[error("statistics query failed: {0}")]
    Query(String),
}

/// Delivery errors. Logged only; the computed snapshot is dropped and the
/// next pass recomputes fresh data.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to serialize the snapshot.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Delivery itself failed.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Cumulative counters for the target's own database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCounters {
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub tup_returned: i64,
    pub tup_fetched: i64,
}

/// One target's collected statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Name of the target the data was collected from.
    pub target: String,
    /// Collection timestamp.
    pub collected_at: DateTime<Utc>,
    /// Server version string.
    pub server_version: String,
    /// Number of connected backends at collection time.
    pub backends: i64,
    /// Database-level cumulative counters.
    pub database: DatabaseCounters,
}

/// Delivery of completed snapshots.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Deliver one target's snapshot.
    async fn deliver(&self, snapshot: &TargetSnapshot) -> Result<(), SinkError>;
}

/// Prints the data that would have been submitted, without submitting.
///
/// Backs the `--dry-run` flag.
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait]
impl Sink for DryRunSink {
    async fn deliver(&self, snapshot: &TargetSnapshot) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        tracing::info!(target = %snapshot.target, "dry run - data that would have been submitted:\n{json}");
        Ok(())
    }
}

/// Records a one-line summary of each delivered snapshot.
///
/// Stands in for a wire submitter; the submission transport is pluggable
/// behind [`Sink`].
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    async fn deliver(&self, snapshot: &TargetSnapshot) -> Result<(), SinkError> {
        tracing::info!(
            target = %snapshot.target,
            server_version = %snapshot.server_version,
            backends = snapshot.backends,
            "snapshot collected"
        );
        Ok(())
    }
}

/// One configured target with its live connection.
#[derive(Debug)]
pub struct Target<C> {
    /// The target's configuration, kept for identification and logging.
    pub config: TargetConfig,
    /// The live connection handle.
    pub conn: C,
}

/// Run one collection pass across all live targets.
///
/// Sequential fan-out: each target is collected and delivered before the
/// next one starts. Collection and delivery failures are logged against the
/// target's name and never abort the pass for the remaining targets.
pub async fn run_pass<D: Driver>(driver: &D, targets: &[Target<D::Conn>], sink: &dyn Sink) {
    tracing::debug!(targets = targets.len(), "collection pass starting");

    for target in targets {
        let span = tracing::info_span!("target", name = %target.config.name);
        async {
            match driver.collect(&target.config, &target.conn).await {
                Ok(snapshot) => {
                    if let Err(e) = sink.deliver(&snapshot).await {
                        tracing::warn!(error = %e, "failed to deliver snapshot");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "statistics collection failed");
                }
            }
        }
        .instrument(span)
        .await;
    }
}
