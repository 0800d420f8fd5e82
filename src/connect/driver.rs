//! The database driver seam.

use async_trait::async_trait;
use thiserror::Error;

use crate::collect::{CollectError, TargetSnapshot};
use crate::config::TargetConfig;

/// Transport security as the wire protocol knows it.
///
/// The protocol has no "prefer" handshake; a connection attempt is either
/// encrypted or plaintext. The policy-level `prefer` mode is resolved in
/// [`establish`](super::establish) by trying [`WireSsl::Require`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireSsl {
    /// Plaintext connection.
    Disable,
    /// TLS-encrypted connection; fail if the server has TLS disabled.
    Require,
}

/// Connection-layer errors, tagged per attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The server answered the TLS negotiation with "not supported".
    ///
    /// This is the one condition the "prefer" fallback reacts to. Drivers
    /// must map their typed TLS-refusal error to this variant rather than
    /// matching on error message text.
    #[error("server does not support TLS")]
    TlsUnsupported,

    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The connection opened but the liveness round-trip failed.
    #[error("liveness check failed: {0}")]
    Ping(String),
}

/// Primitives for talking to one monitored server.
///
/// The daemon core only ever sees this trait; the production implementation
/// is [`PostgresDriver`](super::PostgresDriver), tests substitute scripted
/// mocks.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Live connection handle. Cheap to share; owned by the generation that
    /// opened it.
    type Conn: Send + Sync + 'static;

    /// Open a connection with the given wire-level security.
    async fn open(&self, target: &TargetConfig, ssl: WireSsl)
    -> Result<Self::Conn, ConnectError>;

    /// Round-trip liveness check.
    async fn ping(&self, conn: &Self::Conn) -> Result<(), ConnectError>;

    /// Run one statistics collection against the target.
    async fn collect(
        &self,
        target: &TargetConfig,
        conn: &Self::Conn,
    ) -> Result<TargetSnapshot, CollectError>;

    /// Close the connection. Close failures are not reported; the handle is
    /// unusable afterwards either way.
    async fn close(&self, conn: &Self::Conn);
}
