//! Error types for pgproc

use thiserror::Error;

/// Error returned by every pgproc operation
#[derive(Error, Debug)]
pub enum PgProcError {
    /// The routine name denotes a private routine (leading underscore).
    #[error("function not callable: {0}")]
    NotCallable(String),

    /// Neither catalog lookup matched schema, name and argument count.
    #[error("procedure not found: {schema}.{name} with {nargs} argument(s)")]
    ProcedureNotFound {
        schema: String,
        name: String,
        nargs: usize,
    },

    /// A catalog field has no member with a matching name on the destination record.
    #[error("no member on {record} matches field `{field}`")]
    BindMismatch { field: String, record: &'static str },

    /// The destination cannot hold what the routine returns.
    #[error("{routine} returns {found} but the destination expects {expected}")]
    ShapeMismatch {
        routine: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PgProcError {
    /// Whether this error came from the database driver: statement execution,
    /// row decoding, value conversion or connectivity.
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            PgProcError::Driver(_) | PgProcError::Conversion(_) | PgProcError::Connection(_)
        )
    }

    pub(crate) fn conversion(from: &crate::Value, to: &str) -> Self {
        PgProcError::Conversion(format!("cannot convert {} into {}", from.kind(), to))
    }
}

/// Result type alias for pgproc operations
pub type Result<T> = std::result::Result<T, PgProcError>;
