//! PostgreSQL connection for pgproc, built on tokio-postgres

mod connection;
mod numeric;
mod timestamp;
mod tls;

pub use connection::{PostgresConnection, to_pg_config};
pub use tls::{TlsError, build_connector};
