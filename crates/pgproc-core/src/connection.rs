//! Connection trait

use crate::{QueryResult, Result, Row, Value};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Rows of a statement, pulled one at a time from the server.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// A database connection able to run parameterized statements
///
/// This is the seam between routine invocation and the database client
/// library. Parameters are positional (`$1..$N`) and converted by the
/// implementation.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement and collect every row
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement and stream its rows without collecting them.
    ///
    /// Errors raised while the server produces rows (including exceptions
    /// raised by a routine body) surface as stream items.
    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream>;
}
