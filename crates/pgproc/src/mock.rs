//! Scripted in-memory connection for unit tests

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use pgproc_core::{Connection, PgProcError, QueryResult, Result, Row, RowStream, Value};

use crate::catalog::{COMPOSITE_RETURN_QUERY, SCALAR_RETURN_QUERY};
use crate::invocation;

pub(crate) enum Returns {
    Scalar(&'static str),
    Composite(Vec<(&'static str, &'static str)>),
}

pub(crate) enum Body {
    Rows(Vec<Vec<Value>>),
    /// Rows delivered before the routine raises
    RowsThenRaise(Vec<Vec<Value>>, &'static str),
}

pub(crate) struct MockRoutine {
    schema: &'static str,
    name: &'static str,
    nargs: usize,
    returns_set: bool,
    returns: Returns,
    body: Body,
}

impl MockRoutine {
    pub(crate) fn scalar(name: &'static str, type_name: &'static str, rows: Vec<Value>) -> Self {
        Self {
            schema: "tests",
            name,
            nargs: 0,
            returns_set: false,
            returns: Returns::Scalar(type_name),
            body: Body::Rows(rows.into_iter().map(|v| vec![v]).collect()),
        }
    }

    pub(crate) fn composite(
        name: &'static str,
        fields: Vec<(&'static str, &'static str)>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            schema: "tests",
            name,
            nargs: 0,
            returns_set: false,
            returns: Returns::Composite(fields),
            body: Body::Rows(rows),
        }
    }

    pub(crate) fn setof(mut self) -> Self {
        self.returns_set = true;
        self
    }

    pub(crate) fn nargs(mut self, nargs: usize) -> Self {
        self.nargs = nargs;
        self
    }

    pub(crate) fn raising(mut self, message: &'static str) -> Self {
        let rows = match self.body {
            Body::Rows(rows) | Body::RowsThenRaise(rows, _) => rows,
        };
        self.body = Body::RowsThenRaise(rows, message);
        self
    }

    fn columns(&self) -> Vec<String> {
        match &self.returns {
            Returns::Scalar(_) => vec![self.name.to_string()],
            Returns::Composite(fields) => fields.iter().map(|(n, _)| n.to_string()).collect(),
        }
    }
}

/// Answers the two catalog lookups and routine invocations from a script.
/// Counts every statement and every row pulled from a stream.
#[derive(Default)]
pub(crate) struct MockConnection {
    routines: Vec<MockRoutine>,
    fail_catalog: bool,
    statements: Mutex<Vec<String>>,
    pulled: Arc<AtomicUsize>,
}

impl MockConnection {
    pub(crate) fn new(routines: Vec<MockRoutine>) -> Self {
        Self {
            routines,
            ..Self::default()
        }
    }

    pub(crate) fn failing_catalog() -> Self {
        Self {
            fail_catalog: true,
            ..Self::default()
        }
    }

    pub(crate) fn statement_count(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    /// Rows taken from invocation streams so far
    pub(crate) fn rows_pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    fn find(&self, params: &[Value]) -> Option<&MockRoutine> {
        let [schema, name, nargs] = params else {
            return None;
        };
        self.routines.iter().find(|r| {
            schema.as_str() == Some(r.schema)
                && name.as_str() == Some(r.name)
                && nargs.as_i64() == Some(r.nargs as i64)
        })
    }

    fn catalog(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        if self.fail_catalog {
            return Err(PgProcError::Connection("connection reset".into()));
        }

        let routine = self.find(params);
        let row = match (sql, routine.map(|r| &r.returns)) {
            (SCALAR_RETURN_QUERY, Some(Returns::Scalar(type_name))) => Some(vec![
                Value::from(*type_name),
                Value::Bool(routine.is_some_and(|r| r.returns_set)),
            ]),
            (COMPOSITE_RETURN_QUERY, Some(Returns::Composite(fields))) => {
                let names = fields.iter().map(|(n, _)| Value::from(*n)).collect();
                let types = fields.iter().map(|(_, t)| Value::from(*t)).collect();
                Some(vec![
                    Value::Array(names),
                    Value::Array(types),
                    Value::Bool(routine.is_some_and(|r| r.returns_set)),
                ])
            }
            _ => None,
        };

        Ok(QueryResult {
            rows: row
                .map(|values| vec![Row::new(Vec::new(), values)])
                .unwrap_or_default(),
        })
    }

    fn invoked(&self, sql: &str, params: &[Value]) -> Result<&MockRoutine> {
        self.routines
            .iter()
            .find(|r| invocation::build(r.schema, r.name, r.nargs) == sql && r.nargs == params.len())
            .ok_or_else(|| PgProcError::Driver(format!("function does not exist: {}", sql)))
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.statements.lock().unwrap().push(sql.to_string());
        if sql == SCALAR_RETURN_QUERY || sql == COMPOSITE_RETURN_QUERY {
            return self.catalog(sql, params);
        }

        let routine = self.invoked(sql, params)?;
        let columns = routine.columns();
        match &routine.body {
            Body::Rows(rows) => Ok(QueryResult {
                rows: rows
                    .iter()
                    .map(|values| Row::new(columns.clone(), values.clone()))
                    .collect(),
            }),
            Body::RowsThenRaise(_, message) => Err(PgProcError::Driver(message.to_string())),
        }
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        self.statements.lock().unwrap().push(sql.to_string());
        let routine = self.invoked(sql, params)?;
        let columns = routine.columns();

        let (rows, raise) = match &routine.body {
            Body::Rows(rows) => (rows.clone(), None),
            Body::RowsThenRaise(rows, message) => (rows.clone(), Some(*message)),
        };
        let mut items: Vec<Result<Row>> = rows
            .into_iter()
            .map(|values| Ok(Row::new(columns.clone(), values)))
            .collect();
        if let Some(message) = raise {
            items.push(Err(PgProcError::Driver(message.to_string())));
        }

        let pulled = Arc::clone(&self.pulled);
        Ok(futures::stream::iter(items)
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed())
    }
}
