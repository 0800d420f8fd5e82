//! Production driver backed by sqlx.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};

use crate::collect::{CollectError, DatabaseCounters, TargetSnapshot};
use crate::config::TargetConfig;

use super::driver::{ConnectError, Driver, WireSsl};

/// Statistics driver for PostgreSQL servers.
///
/// Each target gets its own single-connection pool so the handle is cheap to
/// share with the schedule loop and can be closed from a reference.
#[derive(Debug, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    fn connect_options(target: &TargetConfig, ssl: WireSsl) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database)
            .username(&target.username)
            .ssl_mode(match ssl {
                WireSsl::Disable => PgSslMode::Disable,
                WireSsl::Require => PgSslMode::Require,
            })
            .application_name("pgharvest");
        if !target.password.is_empty() {
            options = options.password(&target.password);
        }
        options
    }
}

fn map_open_error(e: sqlx::Error) -> ConnectError {
    match e {
        // The server declined the TLS negotiation; the named condition the
        // "prefer" fallback reacts to.
        sqlx::Error::Tls(_) => ConnectError::TlsUnsupported,
        other => ConnectError::Connect(other.to_string()),
    }
}

fn map_query_error(e: sqlx::Error) -> CollectError {
    CollectError::Query(e.to_string())
}

#[async_trait]
impl Driver for PostgresDriver {
    type Conn = PgPool;

    async fn open(
        &self,
        target: &TargetConfig,
        ssl: WireSsl,
    ) -> Result<Self::Conn, ConnectError> {
        tracing::debug!(target = %target.name, host = %target.host, port = target.port, ?ssl, "opening connection");

        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(target.connect_timeout)
            .connect_with(Self::connect_options(target, ssl))
            .await
            .map_err(map_open_error)
    }

    async fn ping(&self, conn: &Self::Conn) -> Result<(), ConnectError> {
        sqlx::query("SELECT 1")
            .execute(conn)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                sqlx::Error::Tls(_) => ConnectError::TlsUnsupported,
                other => ConnectError::Ping(other.to_string()),
            })
    }

    async fn collect(
        &self,
        target: &TargetConfig,
        conn: &Self::Conn,
    ) -> Result<TargetSnapshot, CollectError> {
        let server_version: String = sqlx::query_scalar("SHOW server_version")
            .fetch_one(conn)
            .await
            .map_err(map_query_error)?;

        let backends: i64 = sqlx::query_scalar("SELECT count(*) FROM pg_stat_activity")
            .fetch_one(conn)
            .await
            .map_err(map_query_error)?;

        let (xact_commit, xact_rollback, blks_read, blks_hit, tup_returned, tup_fetched): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            "SELECT xact_commit, xact_rollback, blks_read, blks_hit, tup_returned, tup_fetched \
             FROM pg_stat_database WHERE datname = current_database()",
        )
        .fetch_one(conn)
        .await
        .map_err(map_query_error)?;

        Ok(TargetSnapshot {
            target: target.name.clone(),
            collected_at: Utc::now(),
            server_version,
            backends,
            database: DatabaseCounters {
                xact_commit,
                xact_rollback,
                blks_read,
                blks_hit,
                tup_returned,
                tup_fetched,
            },
        })
    }

    async fn close(&self, conn: &Self::Conn) {
        conn.close().await;
    }
}
