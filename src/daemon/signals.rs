//! OS signal wiring for the daemon control channel.

use tokio::sync::mpsc;

/// External control events delivered to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Tear down the active generation and rebuild it from configuration.
    Reload,
    /// Stop scheduling, drain in-flight work, and exit.
    Terminate,
}

/// Spawn the OS signal listener and return the daemon's control channel.
///
/// SIGHUP maps to [`ControlSignal::Reload`]; SIGINT, SIGTERM, and Ctrl-C map
/// to [`ControlSignal::Terminate`]. The listener runs until the receiving
/// side is dropped.
#[cfg(unix)]
pub fn spawn_listener() -> std::io::Result<mpsc::Receiver<ControlSignal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = hangup.recv() => ControlSignal::Reload,
                _ = interrupt.recv() => ControlSignal::Terminate,
                _ = terminate.recv() => ControlSignal::Terminate,
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Spawn the OS signal listener and return the daemon's control channel.
///
/// Non-unix platforms only get Ctrl-C, mapped to
/// [`ControlSignal::Terminate`]; there is no reload signal.
#[cfg(not(unix))]
pub fn spawn_listener() -> std::io::Result<mpsc::Receiver<ControlSignal>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }
            if tx.send(ControlSignal::Terminate).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
