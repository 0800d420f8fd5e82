//! Daemon Lifecycle Integration Tests
//!
//! Exercises the full load → connect → schedule → reload → drain cycle
//! against a scripted driver, without a PostgreSQL server.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pgharvest::collect::{CollectError, DatabaseCounters, SinkError};
use pgharvest::daemon::ControlSignal;
use pgharvest::{
    ConnectError, Daemon, Driver, Sink, TargetConfig, TargetSnapshot, WireSsl,
};
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Default)]
struct ScriptState {
    /// Targets whose connection attempts are refused outright.
    refuse_connect: HashSet<String>,
    /// Targets that decline the TLS negotiation.
    refuse_tls: HashSet<String>,
    /// Every successful open, with the wire security it used.
    opened: Mutex<Vec<(String, WireSsl)>>,
    closed: Mutex<usize>,
    /// How long one collection takes.
    collect_delay: Duration,
    collect_started: Notify,
    collect_finished: AtomicBool,
    /// Ordered trace of driver calls, for lifecycle-ordering assertions.
    events: Mutex<Vec<&'static str>>,
}

impl ScriptState {
    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Clone)]
struct ScriptedDriver {
    state: Arc<ScriptState>,
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Conn = String;

    async fn open(&self, target: &TargetConfig, ssl: WireSsl) -> Result<Self::Conn, ConnectError> {
        if self.state.refuse_connect.contains(&target.name) {
            return Err(ConnectError::Connect("connection refused".to_string()));
        }
        if self.state.refuse_tls.contains(&target.name) && ssl == WireSsl::Require {
            return Err(ConnectError::TlsUnsupported);
        }
        self.state
            .opened
            .lock()
            .unwrap()
            .push((target.name.clone(), ssl));
        self.state.record("open");
        Ok(target.name.clone())
    }

    async fn ping(&self, _conn: &Self::Conn) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn collect(
        &self,
        target: &TargetConfig,
        _conn: &Self::Conn,
    ) -> Result<TargetSnapshot, CollectError> {
        self.state.collect_started.notify_one();
        if !self.state.collect_delay.is_zero() {
            tokio::time::sleep(self.state.collect_delay).await;
        }
        self.state.collect_finished.store(true, Ordering::SeqCst);
        self.state.record("collect-done");
        Ok(TargetSnapshot {
            target: target.name.clone(),
            collected_at: Utc::now(),
            server_version: "16.3".to_string(),
            backends: 1,
            database: DatabaseCounters::default(),
        })
    }

    async fn close(&self, _conn: &Self::Conn) {
        *self.state.closed.lock().unwrap() += 1;
        self.state.record("close");
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl Sink for RecordingSink {
    async fn deliver(&self, snapshot: &TargetSnapshot) -> Result<(), SinkError> {
        self.delivered.lock().unwrap().push(snapshot.target.clone());
        Ok(())
    }
}

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp config");
    file.write_all(yaml.as_bytes()).expect("failed to write temp config");
    file
}

fn build_daemon(
    state: ScriptState,
    config: &tempfile::NamedTempFile,
) -> (Arc<Daemon<ScriptedDriver>>, Arc<ScriptState>, Arc<RecordingSink>) {
    let state = Arc::new(state);
    let sink = Arc::new(RecordingSink::default());
    let driver = ScriptedDriver {
        state: Arc::clone(&state),
    };
    let daemon = Arc::new(Daemon::new(driver, sink.clone(), config.path()));
    (daemon, state, sink)
}

// =============================================================================
// One-Shot Mode
// =============================================================================

#[tokio::test]
async fn test_one_shot_collects_only_reachable_targets() {
    let config = write_config(
        r#"
targets:
  - {name: one, host: db1, database: app, username: c}
  - {name: two, host: db2, database: app, username: c}
  - {name: three, host: db3, database: app, username: c}
"#,
    );
    let (daemon, _state, sink) = build_daemon(
        ScriptState {
            refuse_connect: HashSet::from(["two".to_string()]),
            ..ScriptState::default()
        },
        &config,
    );

    daemon.run_once().await.expect("one-shot run should succeed");

    assert_eq!(*sink.delivered.lock().unwrap(), vec!["one", "three"]);
}

#[tokio::test]
async fn test_one_shot_applies_tls_fallback() {
    let config = write_config(
        r#"
targets:
  - {name: legacy, host: db1, database: app, username: c, ssl_mode: prefer}
"#,
    );
    let (daemon, state, sink) = build_daemon(
        ScriptState {
            refuse_tls: HashSet::from(["legacy".to_string()]),
            ..ScriptState::default()
        },
        &config,
    );

    daemon.run_once().await.expect("one-shot run should succeed");

    // The TLS refusal triggered exactly one plaintext retry, and the target
    // still produced data.
    assert_eq!(
        *state.opened.lock().unwrap(),
        vec![("legacy".to_string(), WireSsl::Disable)]
    );
    assert_eq!(*sink.delivered.lock().unwrap(), vec!["legacy"]);
}

#[tokio::test]
async fn test_one_shot_fails_on_bad_schedule() {
    let config = write_config(
        r#"
schedule:
  intervals: {standard: "every ten minutes or so"}
  groups:
    stats: {interval: standard}
targets: []
"#,
    );
    let (daemon, _state, _sink) = build_daemon(ScriptState::default(), &config);

    assert!(daemon.run_once().await.is_err());
}

// =============================================================================
// Reload
// =============================================================================

#[tokio::test]
async fn test_reload_builds_a_fresh_generation() {
    let config = write_config(
        r#"
targets:
  - {name: primary, host: db1, database: app, username: c}
"#,
    );
    let (daemon, state, _sink) = build_daemon(ScriptState::default(), &config);

    let (tx, rx) = mpsc::channel(4);
    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(ControlSignal::Reload).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(ControlSignal::Terminate).await.unwrap();

    timeout(Duration::from_secs(5), runner)
        .await
        .expect("daemon should stop after terminate")
        .unwrap();

    // Two generations, each with its own connection; the first was closed
    // before the second was opened, and both were closed by the end.
    assert_eq!(state.opened.lock().unwrap().len(), 2);
    assert_eq!(*state.closed.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_reload_waits_for_in_flight_pass() {
    let config = write_config(
        r#"
schedule:
  intervals: {fast: "* * * * * *"}
  groups:
    stats: {interval: fast}
targets:
  - {name: primary, host: db1, database: app, username: c}
"#,
    );
    let (daemon, state, _sink) = build_daemon(
        ScriptState {
            collect_delay: Duration::from_millis(300),
            ..ScriptState::default()
        },
        &config,
    );

    let (tx, rx) = mpsc::channel(4);
    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(rx).await })
    };

    // Reload while the every-second schedule has a pass mid-collection. The
    // control channel is ordered, so the daemon processes the reload fully
    // before it sees the terminate.
    timeout(Duration::from_secs(3), state.collect_started.notified())
        .await
        .expect("a collection pass should have started");
    tx.send(ControlSignal::Reload).await.unwrap();
    tx.send(ControlSignal::Terminate).await.unwrap();

    timeout(Duration::from_secs(5), runner)
        .await
        .expect("daemon should stop after terminate")
        .unwrap();

    // The old generation's connection closed only after the in-flight pass
    // completed, and the new generation opened only after that close.
    let events = state.events.lock().unwrap();
    assert_eq!(events[..4], ["open", "collect-done", "close", "open"]);
    assert_eq!(*events.last().unwrap(), "close");
    assert_eq!(state.opened.lock().unwrap().len(), 2);
    assert_eq!(*state.closed.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_config_error_keeps_daemon_waiting_for_signal() {
    let (daemon, state, _sink) = {
        let config = write_config("targets: []");
        let (daemon, state, sink) = build_daemon(ScriptState::default(), &config);
        // The temp file is dropped here, so the first load fails
        (daemon, state, sink)
    };

    let (tx, rx) = mpsc::channel(4);
    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(rx).await })
    };

    // The daemon does not exit or retry on its own
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!runner.is_finished());

    tx.send(ControlSignal::Terminate).await.unwrap();
    timeout(Duration::from_secs(5), runner)
        .await
        .expect("daemon should stop after terminate")
        .unwrap();

    assert!(state.opened.lock().unwrap().is_empty());
}

// =============================================================================
// Graceful Drain
// =============================================================================

#[tokio::test]
async fn test_terminate_waits_for_in_flight_pass() {
    let config = write_config(
        r#"
schedule:
  intervals: {fast: "* * * * * *"}
  groups:
    stats: {interval: fast}
targets:
  - {name: primary, host: db1, database: app, username: c}
"#,
    );
    let (daemon, state, sink) = build_daemon(
        ScriptState {
            collect_delay: Duration::from_millis(300),
            ..ScriptState::default()
        },
        &config,
    );

    let (tx, rx) = mpsc::channel(4);
    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(rx).await })
    };

    // Wait for the every-second schedule to start a pass, then terminate
    // while the collection is still sleeping.
    timeout(Duration::from_secs(3), state.collect_started.notified())
        .await
        .expect("a collection pass should have started");
    tx.send(ControlSignal::Terminate).await.unwrap();

    timeout(Duration::from_secs(5), runner)
        .await
        .expect("daemon should stop after terminate")
        .unwrap();

    // The already-started pass ran to completion before exit.
    assert!(state.collect_finished.load(Ordering::SeqCst));
    assert_eq!(*sink.delivered.lock().unwrap(), vec!["primary"]);
}

#[tokio::test]
async fn test_terminate_with_no_in_flight_pass_is_prompt() {
    let config = write_config("targets: []");
    let (daemon, _state, _sink) = build_daemon(ScriptState::default(), &config);

    let (tx, rx) = mpsc::channel(4);
    let runner = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move { daemon.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(ControlSignal::Terminate).await.unwrap();

    timeout(Duration::from_secs(1), runner)
        .await
        .expect("idle daemon should stop promptly")
        .unwrap();
}
