//! Docker container management for integration tests.
//!
//! The PostgreSQL container is started lazily by the first test that needs
//! it, the `tests` schema is installed into it, and the connection details
//! are cached for every later test in the process. Cleanup is left to the
//! testcontainers reaper when the process exits.

use indoc::indoc;
use once_cell::sync::Lazy;
use pgproc::{ConnectionConfig, PostgresConnection, SslMode};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::Mutex;

/// Routines exercised by the integration tests, all in schema `tests`
pub const ROUTINES_SQL: &str = indoc! {r#"
    DROP SCHEMA IF EXISTS tests CASCADE;
    CREATE SCHEMA tests;

    CREATE TYPE tests.pair AS (a integer, b text);
    CREATE TYPE tests.person AS (first_name text, age integer, nickname text);

    CREATE FUNCTION tests.test_returns_integer() RETURNS integer
        LANGUAGE sql AS $$ SELECT 42 $$;
    CREATE FUNCTION tests.test_returns_integer_as_string() RETURNS integer
        LANGUAGE sql AS $$ SELECT 42 $$;
    CREATE FUNCTION tests.test_returns_string() RETURNS text
        LANGUAGE sql AS $$ SELECT 'hello'::text $$;
    CREATE FUNCTION tests.test_returns_numeric() RETURNS numeric
        LANGUAGE sql AS $$ SELECT 3.14159::numeric $$;
    CREATE FUNCTION tests.test_returns_real() RETURNS real
        LANGUAGE sql AS $$ SELECT 3.14::real $$;
    CREATE FUNCTION tests.test_returns_bool_true() RETURNS boolean
        LANGUAGE sql AS $$ SELECT true $$;
    CREATE FUNCTION tests.test_returns_bool_false() RETURNS boolean
        LANGUAGE sql AS $$ SELECT false $$;
    CREATE FUNCTION tests.test_returns_date() RETURNS date
        LANGUAGE sql AS $$ SELECT current_date $$;
    CREATE FUNCTION tests.test_returns_null() RETURNS integer
        LANGUAGE sql AS $$ SELECT NULL::integer $$;
    CREATE FUNCTION tests.test_add(integer, integer) RETURNS integer
        LANGUAGE sql AS $$ SELECT $1 + $2 $$;
    CREATE FUNCTION tests.test_echo_text(text) RETURNS text
        LANGUAGE sql AS $$ SELECT $1 $$;
    CREATE FUNCTION tests.test_echo_timestamp(timestamp) RETURNS timestamp
        LANGUAGE sql AS $$ SELECT $1 $$;
    CREATE FUNCTION tests.test_is_infinite(timestamp) RETURNS boolean
        LANGUAGE sql AS $$ SELECT $1 = 'infinity'::timestamp $$;
    CREATE FUNCTION tests.test_returns_infinity() RETURNS timestamp
        LANGUAGE sql AS $$ SELECT 'infinity'::timestamp $$;
    CREATE FUNCTION tests.test_returns_minus_infinity_date() RETURNS date
        LANGUAGE sql AS $$ SELECT '-infinity'::date $$;
    CREATE FUNCTION tests.test_raises() RETURNS integer
        LANGUAGE plpgsql AS $$
        BEGIN
            RAISE EXCEPTION 'test_raises was called';
        END
        $$;
    CREATE FUNCTION tests._hidden() RETURNS integer
        LANGUAGE sql AS $$ SELECT 1 $$;

    CREATE FUNCTION tests.test_returns_composite() RETURNS tests.pair
        LANGUAGE sql AS $$ SELECT 7, 'seven'::text $$;
    CREATE FUNCTION tests.test_returns_person(text) RETURNS tests.person
        LANGUAGE sql AS $$ SELECT $1, 36, NULL::text $$;

    CREATE FUNCTION tests.test_returns_setof_integer() RETURNS SETOF integer
        LANGUAGE sql AS $$ SELECT generate_series(42, 44) $$;
    CREATE FUNCTION tests.test_returns_empty_set() RETURNS SETOF integer
        LANGUAGE sql AS $$ SELECT generate_series(1, 0) $$;
    CREATE FUNCTION tests.test_returns_many(integer) RETURNS SETOF integer
        LANGUAGE sql AS $$ SELECT generate_series(1, $1) $$;
    CREATE FUNCTION tests.test_returns_setof_composite() RETURNS SETOF tests.pair
        LANGUAGE sql AS $$ VALUES (1, 'one'::text), (2, 'two'::text) $$;
    CREATE FUNCTION tests.test_setof_then_raise() RETURNS SETOF integer
        LANGUAGE plpgsql AS $$
        BEGIN
            RETURN NEXT 1;
            RETURN NEXT 2;
            RAISE EXCEPTION 'set interrupted';
        END
        $$;
"#};

/// Information about a running test server
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Host address (typically 127.0.0.1)
    pub host: String,
    /// Port number (randomly assigned by testcontainers)
    pub port: u16,
    /// Database name
    pub database: String,
    /// Username for authentication
    pub username: String,
    /// Password for authentication
    pub password: String,
}

impl ContainerInfo {
    /// Connection configuration for this server, without TLS
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(&self.host, self.port, &self.database)
            .username(&self.username)
            .password(&self.password)
            .ssl_mode(SslMode::Disable)
            .application_name("pgproc-tests")
    }
}

struct PostgresContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<Postgres>,
    info: ContainerInfo,
}

/// Held across startup so concurrent tests share one container
static POSTGRES_CONTAINER: Lazy<Mutex<Option<PostgresContainer>>> =
    Lazy::new(|| Mutex::new(None));

/// Install [`ROUTINES_SQL`], replacing any previous `tests` schema
pub async fn install_routines(conn: &PostgresConnection) -> anyhow::Result<()> {
    tracing::info!("installing test routines");
    conn.batch_execute(ROUTINES_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("failed to install test routines: {}", e))
}

/// Get or create the PostgreSQL test container with the test routines installed
pub async fn postgres_container() -> anyhow::Result<ContainerInfo> {
    let mut guard = POSTGRES_CONTAINER.lock().await;
    if let Some(container) = guard.as_ref() {
        return Ok(container.info.clone());
    }

    tracing::info!("starting PostgreSQL test container");

    let container = Postgres::default()
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start postgres container: {}", e))?;

    let host_port = container
        .get_host_port_ipv4(5432)
        .await
        .map_err(|e| anyhow::anyhow!("failed to get postgres port: {}", e))?;

    // testcontainers-modules Postgres defaults: postgres user/password with "postgres" database
    let info = ContainerInfo {
        host: "127.0.0.1".to_string(),
        port: host_port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
    };

    tracing::info!(port = host_port, "PostgreSQL test container started");

    let conn = PostgresConnection::connect(&info.config())
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to test container: {}", e))?;
    install_routines(&conn).await?;

    *guard = Some(PostgresContainer {
        inner: container,
        info: info.clone(),
    });

    Ok(info)
}
