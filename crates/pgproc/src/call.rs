//! Call Orchestrator

use std::sync::Arc;

use futures::StreamExt;
use pgproc_core::{
    Connection, ConnectionConfig, FromValue, PgProcError, Result, TimestampSentinels, Value,
};
use pgproc_postgres::PostgresConnection;
use tokio_util::sync::CancellationToken;

use crate::binder::{self, BindingPlan, RecordTarget, ScalarTarget};
use crate::catalog::{self, RoutineShape};
use crate::invocation;
use crate::record::Record;
use crate::sink::{self, RecordSink, ScalarSink, SetofCall};

/// Where a call's results go
pub enum Destination<'a> {
    /// A single scalar slot
    Scalar(&'a mut dyn ScalarTarget),
    /// A single composite record
    Record(&'a mut dyn RecordTarget),
    /// One scalar per row of a set-returning routine
    ScalarSet(&'a mut dyn ScalarSink),
    /// One record per row of a set-returning routine
    RecordSet(&'a mut dyn RecordSink),
}

impl<'a> Destination<'a> {
    pub fn scalar<T: ScalarTarget>(target: &'a mut T) -> Self {
        Destination::Scalar(target)
    }

    pub fn record<R: RecordTarget>(target: &'a mut R) -> Self {
        Destination::Record(target)
    }

    pub fn scalar_set<S: ScalarSink>(sink: &'a mut S) -> Self {
        Destination::ScalarSet(sink)
    }

    pub fn record_set<S: RecordSink>(sink: &'a mut S) -> Self {
        Destination::RecordSet(sink)
    }

    fn describe(&self) -> &'static str {
        match self {
            Destination::Scalar(_) => "a scalar",
            Destination::Record(_) => "a record",
            Destination::ScalarSet(_) => "a set of scalars",
            Destination::RecordSet(_) => "a set of records",
        }
    }

    fn accepts(&self, shape: &RoutineShape) -> bool {
        match self {
            Destination::Scalar(_) => shape.is_scalar() && !shape.is_set(),
            Destination::Record(_) => !shape.is_scalar() && !shape.is_set(),
            Destination::ScalarSet(_) => shape.is_scalar() && shape.is_set(),
            Destination::RecordSet(_) => !shape.is_scalar() && shape.is_set(),
        }
    }
}

/// Calls routines over one connection
pub struct PgProc<C: Connection + 'static = PostgresConnection> {
    conn: Arc<C>,
}

impl<C: Connection + 'static> Clone for PgProc<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

impl PgProc<PostgresConnection> {
    /// Connect to PostgreSQL
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(PostgresConnection::connect(config).await?))
    }

    /// Connect with a libpq-style connection string and the default
    /// infinity sentinels
    pub async fn connect_conninfo(conninfo: &str) -> Result<Self> {
        let conn =
            PostgresConnection::connect_conninfo(conninfo, TimestampSentinels::default()).await?;
        Ok(Self::new(conn))
    }
}

impl<C: Connection + 'static> PgProc<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn: Arc::new(conn),
        }
    }

    pub fn from_arc(conn: Arc<C>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Classify a routine without invoking it
    pub async fn routine_shape(
        &self,
        schema: &str,
        routine: &str,
        nargs: usize,
    ) -> Result<RoutineShape> {
        ensure_callable(routine)?;
        catalog::classify(self.conn.as_ref(), schema, routine, nargs).await
    }

    /// Call `schema.routine` with positional `params` and write the result
    /// into `destination`.
    ///
    /// A single-result routine that returns no row leaves the destination
    /// untouched and succeeds.
    #[tracing::instrument(skip(self, destination, params), fields(nargs = params.len()))]
    pub async fn call(
        &self,
        destination: Destination<'_>,
        schema: &str,
        routine: &str,
        params: &[Value],
    ) -> Result<()> {
        ensure_callable(routine)?;

        let shape = catalog::classify(self.conn.as_ref(), schema, routine, params.len()).await?;
        if !destination.accepts(&shape) {
            return Err(PgProcError::ShapeMismatch {
                routine: format!("{}.{}", schema, routine),
                expected: destination.describe(),
                found: shape.describe(),
            });
        }

        let sql = invocation::build(schema, routine, params.len());
        let field_names = shape.field_names();

        match destination {
            Destination::Scalar(target) => {
                let result = self.conn.query(&sql, params).await?;
                match result.first() {
                    Some(row) => binder::bind_scalar(row, target)?,
                    None => tracing::debug!("no row returned"),
                }
            }
            Destination::Record(target) => {
                let plan =
                    BindingPlan::resolve(&field_names, target.members(), target.record_name())?;
                let result = self.conn.query(&sql, params).await?;
                match result.first() {
                    Some(row) => binder::bind_record(row, &plan, target)?,
                    None => tracing::debug!("no row returned"),
                }
            }
            Destination::ScalarSet(sink) => {
                let mut rows = self.conn.query_stream(&sql, params).await?;
                let mut count = 0usize;
                while let Some(row) = rows.next().await {
                    binder::push_scalar(&row?, sink).await?;
                    count += 1;
                }
                tracing::debug!(row_count = count, "set delivered");
            }
            Destination::RecordSet(sink) => {
                let plan = BindingPlan::resolve(&field_names, sink.members(), sink.record_name())?;
                let mut rows = self.conn.query_stream(&sql, params).await?;
                let mut count = 0usize;
                while let Some(row) = rows.next().await {
                    binder::push_record(&row?, &plan, sink).await?;
                    count += 1;
                }
                tracing::debug!(row_count = count, "set delivered");
            }
        }

        Ok(())
    }

    /// Call a routine returning a single scalar
    pub async fn call_scalar<T>(&self, schema: &str, routine: &str, params: &[Value]) -> Result<T>
    where
        T: FromValue + Default + Send,
    {
        let mut value = T::default();
        self.call(Destination::scalar(&mut value), schema, routine, params)
            .await?;
        Ok(value)
    }

    /// Call a routine returning a single composite value
    pub async fn call_record<R: Record>(
        &self,
        schema: &str,
        routine: &str,
        params: &[Value],
    ) -> Result<R> {
        let mut record = R::default();
        self.call(Destination::record(&mut record), schema, routine, params)
            .await?;
        Ok(record)
    }

    /// Start a call to a routine returning a set of scalars.
    ///
    /// Must be called inside a tokio runtime; the call runs as its own task
    /// and elements become available as rows arrive.
    pub fn stream_scalars<T>(&self, schema: &str, routine: &str, params: Vec<Value>) -> SetofCall<T>
    where
        T: FromValue + Send + 'static,
    {
        self.stream_scalars_with_cancel(schema, routine, params, CancellationToken::new())
    }

    pub fn stream_scalars_with_cancel<T>(
        &self,
        schema: &str,
        routine: &str,
        params: Vec<Value>,
        cancel: CancellationToken,
    ) -> SetofCall<T>
    where
        T: FromValue + Send + 'static,
    {
        let (mut sender, receiver) = sink::setof_channel_with_cancel::<T>(cancel.clone());
        let this = self.clone();
        let schema = schema.to_string();
        let routine = routine.to_string();
        let task = tokio::spawn(async move {
            this.call(Destination::scalar_set(&mut sender), &schema, &routine, &params)
                .await
        });
        SetofCall::new(receiver, task, cancel)
    }

    /// Start a call to a routine returning a set of records.
    ///
    /// Must be called inside a tokio runtime.
    pub fn stream_records<R: Record>(
        &self,
        schema: &str,
        routine: &str,
        params: Vec<Value>,
    ) -> SetofCall<R> {
        self.stream_records_with_cancel(schema, routine, params, CancellationToken::new())
    }

    pub fn stream_records_with_cancel<R: Record>(
        &self,
        schema: &str,
        routine: &str,
        params: Vec<Value>,
        cancel: CancellationToken,
    ) -> SetofCall<R> {
        let (mut sender, receiver) = sink::setof_channel_with_cancel::<R>(cancel.clone());
        let this = self.clone();
        let schema = schema.to_string();
        let routine = routine.to_string();
        let task = tokio::spawn(async move {
            this.call(Destination::record_set(&mut sender), &schema, &routine, &params)
                .await
        });
        SetofCall::new(receiver, task, cancel)
    }
}

/// Routines whose name starts with `_` are private
fn ensure_callable(routine: &str) -> Result<()> {
    if routine.starts_with('_') {
        return Err(PgProcError::NotCallable(routine.to_string()));
    }
    Ok(())
}
