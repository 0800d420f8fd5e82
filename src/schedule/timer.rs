//! The recurring fire loop and its cancellation handle.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Source of fire times for a schedule loop.
///
/// Implementations must be pure: asking for the occurrence after `now` arms
/// nothing and has no side effects.
pub trait Trigger: Send + Sync + 'static {
    /// Earliest occurrence strictly after `now`, or `None` if the trigger
    /// has no future occurrence.
    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// Cron-expression trigger (6-field syntax, seconds first).
///
/// Example: `"0 */10 * * * *"` fires at second 0 of every tenth minute.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    schedule: cron::Schedule,
}

impl CronTrigger {
    /// Parse a cron expression.
    ///
    /// # Errors
    /// Returns the parser error if the expression is malformed.
    pub fn parse(expression: &str) -> Result<Self, cron::error::Error> {
        Ok(Self {
            schedule: cron::Schedule::from_str(expression)?,
        })
    }
}

impl Trigger for CronTrigger {
    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }
}

/// Cancellation handle for one armed schedule loop.
///
/// Consuming [`cancel`](Self::cancel) is the only way to stop the loop, so a
/// handle cannot be cancelled twice. Once `cancel` returns, the loop has
/// exited: no task invocation is mid-flight for this handle and none will
/// ever start.
#[derive(Debug)]
pub struct ScheduleHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Request cancellation and wait for the loop to exit.
    ///
    /// If the loop is currently sleeping towards its next fire time, it wakes
    /// immediately and exits without invoking the task. If the task is
    /// mid-invocation, the loop exits as soon as the invocation returns.
    pub async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "schedule loop terminated abnormally");
        }
    }
}

/// Arm a recurring trigger with a task.
///
/// The loop computes the trigger's next occurrence strictly after the current
/// time, sleeps until it arrives, invokes `task`, and only then recomputes
/// the following occurrence. Invocations therefore never overlap for one
/// handle, and a slow task skips occurrences rather than queueing them.
///
/// The sleep races against cancellation; cancellation wins ties, so a task
/// never starts after [`ScheduleHandle::cancel`] has been observed.
pub fn spawn<T, F, Fut>(name: impl Into<String>, trigger: T, mut task: F) -> ScheduleHandle
where
    T: Trigger,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let token = CancellationToken::new();
    let loop_token = token.clone();

    let join = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let Some(next) = trigger.next_after(now) else {
                tracing::warn!(group = %name, "trigger has no future occurrence, stopping");
                break;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(group = %name, delay_ms = delay.as_millis() as u64, "next run scheduled");

            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => task().await,
            }
        }
    });

    ScheduleHandle { token, join }
}
