//! pgproc - call PostgreSQL routines by name
//!
//! A call classifies what the routine returns from the catalog, builds the
//! `SELECT * FROM schema.routine($1..$N)` statement, runs it and binds the
//! rows into the caller's destination:
//!
//! - a scalar slot (`call_scalar`, `Destination::scalar`)
//! - a record whose members are matched to the composite's field names
//!   (`call_record`, `Destination::record`, [`record!`])
//! - a set of scalars or records streamed one row at a time
//!   (`stream_scalars`, `stream_records`, `Destination::scalar_set`,
//!   `Destination::record_set`)
//!
//! ```ignore
//! let procs = PgProc::connect_conninfo("host=localhost user=app dbname=app").await?;
//! let answer: i32 = procs.call_scalar("tests", "test_returns_integer", &[]).await?;
//! ```

pub mod binder;
mod call;
pub mod catalog;
pub mod invocation;
mod record;
pub mod sink;

#[cfg(test)]
mod mock;

pub use binder::{BindingPlan, RecordTarget, ScalarTarget};
pub use call::{Destination, PgProc};
pub use catalog::{CompositeField, ReturnKind, RoutineShape};
pub use record::Record;
pub use sink::{RecordSink, ScalarSink, SetofCall, SetofReceiver, SetofSender};

pub use pgproc_core::{
    Connection, ConnectionConfig, FromValue, PgProcError, QueryResult, Result, Row, RowStream,
    SslMode, TimestampSentinels, Value,
};
pub use pgproc_postgres::PostgresConnection;
pub use tokio_util::sync::CancellationToken;
