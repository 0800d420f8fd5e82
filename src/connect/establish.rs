//! Connection establishment with the "prefer" fallback policy.

use crate::config::{SslMode, TargetConfig};

use super::driver::{ConnectError, Driver, WireSsl};

/// Open and verify a connection to one target.
///
/// For `ssl_mode: prefer` the attempt order is: TLS required first; if the
/// server reports the TLS-unsupported condition, exactly one retry with TLS
/// disabled. Any other failure of the first attempt is returned as-is. The
/// `disable` and `require` modes are attempted once, verbatim.
///
/// A connection is only returned after a successful liveness round-trip; a
/// failed ping counts as a failed attempt, including for fallback purposes.
///
/// Failures never affect other targets; the caller logs the error against
/// the target's name and excludes the target from the generation.
pub async fn establish<D: Driver>(
    driver: &D,
    target: &TargetConfig,
) -> Result<D::Conn, ConnectError> {
    match target.ssl_mode {
        SslMode::Disable => open_verified(driver, target, WireSsl::Disable).await,
        SslMode::Require => open_verified(driver, target, WireSsl::Require).await,
        SslMode::Prefer => match open_verified(driver, target, WireSsl::Require).await {
            Err(ConnectError::TlsUnsupported) => {
                tracing::info!(
                    target = %target.name,
                    "server has TLS disabled, retrying without encryption"
                );
                open_verified(driver, target, WireSsl::Disable).await
            }
            other => other,
        },
    }
}

/// One attempt: open, then verify liveness. A connection that fails the ping
/// is closed and the ping error becomes the attempt's outcome.
async fn open_verified<D: Driver>(
    driver: &D,
    target: &TargetConfig,
    ssl: WireSsl,
) -> Result<D::Conn, ConnectError> {
    let conn = driver.open(target, ssl).await?;
    if let Err(e) = driver.ping(&conn).await {
        driver.close(&conn).await;
        return Err(e);
    }
    Ok(conn)
}
