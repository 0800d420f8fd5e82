//! Counted wait for in-flight collection passes.

use tokio::sync::watch;

/// Shared counter of currently-executing collection passes.
///
/// Incremented once per pass (not per target) via the RAII [`PassGuard`];
/// the shutdown path blocks on [`wait_idle`](Self::wait_idle) until every
/// already-started pass has finished.
#[derive(Debug, Clone)]
pub struct InFlight {
    count: watch::Sender<usize>,
}

impl InFlight {
    /// New counter at zero.
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Mark a pass as started. The pass ends when the guard drops.
    pub fn begin(&self) -> PassGuard {
        self.count.send_modify(|n| *n += 1);
        PassGuard {
            count: self.count.clone(),
        }
    }

    /// Number of passes currently executing.
    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until no pass is executing. Returns immediately when idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // self holds the sender, so the channel cannot close under us
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one executing pass.
#[derive(Debug)]
pub struct PassGuard {
    count: watch::Sender<usize>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n -= 1);
    }
}
