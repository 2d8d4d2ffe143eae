//! pgproc core - shared abstractions for calling PostgreSQL routines
//!
//! This crate provides the types every other pgproc crate depends on:
//!
//! - `Connection` - the trait a database client implements to run statements
//! - `Value`, `Row`, `QueryResult` - decoded data
//! - `FromValue` - driver-level conversion into Rust destination types
//! - `ConnectionConfig`, `TimestampSentinels` - configuration
//! - `PgProcError` - the error taxonomy

mod config;
mod connection;
mod convert;
mod error;
mod types;

pub use config::*;
pub use connection::*;
pub use convert::*;
pub use error::*;
pub use types::*;
