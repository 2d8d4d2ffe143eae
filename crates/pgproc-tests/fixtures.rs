//! Shared fixtures for the integration tests.
//!
//! Each test gets its own [`PgProc`] (the connection task lives on the
//! test's runtime) while the server and its routines are shared.
//!
//! Set `PGPROC_TEST_CONNINFO` to a libpq connection string to run against
//! an existing server instead of a container. The routines are installed
//! into that server's `tests` schema, replacing it.

use std::env;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use pgproc::{PgProc, PostgresConnection, TimestampSentinels};
use tokio::sync::Mutex;

use crate::test_containers::{install_routines, postgres_container};

/// Schema holding every test routine
pub const SCHEMA: &str = "tests";

/// Whether the routines were installed into the `PGPROC_TEST_CONNINFO` server
static MANUAL_INSTALLED: Lazy<Mutex<bool>> = Lazy::new(|| Mutex::new(false));

fn manual_conninfo() -> Option<String> {
    env::var("PGPROC_TEST_CONNINFO")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Open a connection to the test server using `sentinels`
pub async fn test_connection_with(sentinels: TimestampSentinels) -> Result<PostgresConnection> {
    initialize_logging();

    if let Some(conninfo) = manual_conninfo() {
        let conn = PostgresConnection::connect_conninfo(&conninfo, sentinels)
            .await
            .context("failed to connect with PGPROC_TEST_CONNINFO")?;

        let mut installed = MANUAL_INSTALLED.lock().await;
        if !*installed {
            install_routines(&conn).await?;
            *installed = true;
        }
        return Ok(conn);
    }

    let info = postgres_container().await?;
    let config = info.config().sentinels(sentinels);
    PostgresConnection::connect(&config)
        .await
        .context("failed to connect to test container")
}

/// A `PgProc` on the test server with the default sentinels
pub async fn test_procs() -> Result<PgProc> {
    test_procs_with(TimestampSentinels::default()).await
}

/// A `PgProc` on the test server with custom infinity sentinels
pub async fn test_procs_with(sentinels: TimestampSentinels) -> Result<PgProc> {
    Ok(PgProc::new(test_connection_with(sentinels).await?))
}

fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pgproc=debug,pgproc_tests=debug"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
