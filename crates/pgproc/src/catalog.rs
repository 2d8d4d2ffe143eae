//! Catalog Resolver
//!
//! Classifies what a routine returns by probing `pg_proc` twice: once for a
//! base, pseudo or enum return type, then for a composite (row) type. Each
//! lookup matches schema, routine name and the exact argument count.

use pgproc_core::{Connection, FromValue, PgProcError, Result, Row, Value};

/// Lookup for routines returning a base (`b`), pseudo (`p`) or enum (`e`) type.
pub const SCALAR_RETURN_QUERY: &str = "\
SELECT
  pg_type_ret.typname,
  proretset
FROM pg_proc
INNER JOIN pg_type pg_type_ret ON pg_type_ret.oid = pg_proc.prorettype
INNER JOIN pg_namespace pg_namespace_ret ON pg_namespace_ret.oid = pg_type_ret.typnamespace
INNER JOIN pg_namespace pg_namespace_proc ON pg_namespace_proc.oid = pg_proc.pronamespace
WHERE
  pg_namespace_proc.nspname = $1 AND
  proname = $2 AND
  pronargs = $3 AND
  pg_type_ret.typtype IN ('b', 'p', 'e')
ORDER BY pg_proc.oid";

/// Lookup for routines returning a composite type, with its attribute names
/// and attribute type names in attribute-number order.
pub const COMPOSITE_RETURN_QUERY: &str = "\
SELECT
  (SELECT array_agg(attname ORDER BY attnum) FROM pg_attribute
   WHERE attrelid = pg_type_ret.typrelid AND attnum > 0 AND NOT attisdropped),
  (SELECT array_agg(typname ORDER BY attnum) FROM pg_attribute
   INNER JOIN pg_type ON pg_attribute.atttypid = pg_type.oid
   WHERE attrelid = pg_type_ret.typrelid AND attnum > 0 AND NOT attisdropped),
  proretset
FROM pg_proc
INNER JOIN pg_type pg_type_ret ON pg_type_ret.oid = pg_proc.prorettype
INNER JOIN pg_namespace pg_namespace_proc ON pg_namespace_proc.oid = pg_proc.pronamespace
WHERE
  pg_namespace_proc.nspname = $1 AND
  proname = $2 AND
  pronargs = $3 AND
  pg_type_ret.typtype IN ('c')
ORDER BY pg_proc.oid";

/// One attribute of a composite return type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeField {
    pub name: String,
    pub type_name: String,
}

/// Scalar or composite return type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    Scalar { type_name: String },
    Composite { fields: Vec<CompositeField> },
}

/// What a routine returns, as reported by the catalog.
///
/// Computed for every call and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineShape {
    pub returns_set: bool,
    pub kind: ReturnKind,
}

impl RoutineShape {
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, ReturnKind::Scalar { .. })
    }

    pub fn is_set(&self) -> bool {
        self.returns_set
    }

    /// Return type name, for scalar routines
    pub fn scalar_type_name(&self) -> Option<&str> {
        match &self.kind {
            ReturnKind::Scalar { type_name } => Some(type_name),
            ReturnKind::Composite { .. } => None,
        }
    }

    /// Composite field names in attribute order; empty for scalar routines
    pub fn field_names(&self) -> Vec<&str> {
        self.fields().iter().map(|f| f.name.as_str()).collect()
    }

    /// Composite field type names, positionally matching `field_names`
    pub fn field_type_names(&self) -> Vec<&str> {
        self.fields().iter().map(|f| f.type_name.as_str()).collect()
    }

    fn fields(&self) -> &[CompositeField] {
        match &self.kind {
            ReturnKind::Composite { fields } => fields,
            ReturnKind::Scalar { .. } => &[],
        }
    }

    /// Short description used in shape mismatch errors
    pub fn describe(&self) -> &'static str {
        match (self.is_scalar(), self.returns_set) {
            (true, false) => "a scalar",
            (true, true) => "a set of scalars",
            (false, false) => "a record",
            (false, true) => "a set of records",
        }
    }
}

fn column<T: FromValue>(row: &Row, idx: usize) -> Result<T> {
    let value = row.get(idx).ok_or_else(|| {
        PgProcError::Driver(format!("catalog row has no column {}", idx))
    })?;
    T::from_value(value)
}

fn lookup_params(schema: &str, routine: &str, nargs: usize) -> Vec<Value> {
    vec![
        Value::from(schema),
        Value::from(routine),
        Value::Int64(nargs as i64),
    ]
}

async fn lookup_scalar(
    conn: &dyn Connection,
    schema: &str,
    routine: &str,
    nargs: usize,
) -> Result<Option<RoutineShape>> {
    let result = conn
        .query(SCALAR_RETURN_QUERY, &lookup_params(schema, routine, nargs))
        .await?;
    let Some(row) = result.first() else {
        return Ok(None);
    };

    Ok(Some(RoutineShape {
        returns_set: column(row, 1)?,
        kind: ReturnKind::Scalar {
            type_name: column(row, 0)?,
        },
    }))
}

async fn lookup_composite(
    conn: &dyn Connection,
    schema: &str,
    routine: &str,
    nargs: usize,
) -> Result<Option<RoutineShape>> {
    let result = conn
        .query(COMPOSITE_RETURN_QUERY, &lookup_params(schema, routine, nargs))
        .await?;
    let Some(row) = result.first() else {
        return Ok(None);
    };

    // array_agg over no attributes yields NULL
    let names: Vec<String> = column::<Option<Vec<String>>>(row, 0)?.unwrap_or_default();
    let type_names: Vec<String> = column::<Option<Vec<String>>>(row, 1)?.unwrap_or_default();
    if names.len() != type_names.len() {
        return Err(PgProcError::Driver(format!(
            "composite return type reports {} names but {} types",
            names.len(),
            type_names.len()
        )));
    }

    let fields = names
        .into_iter()
        .zip(type_names)
        .map(|(name, type_name)| CompositeField { name, type_name })
        .collect();

    Ok(Some(RoutineShape {
        returns_set: column(row, 2)?,
        kind: ReturnKind::Composite { fields },
    }))
}

/// Classify the return shape of `schema.routine` taking `nargs` arguments.
///
/// Any failure, including a lookup that errors out, is reported as
/// `ProcedureNotFound`.
#[tracing::instrument(skip(conn))]
pub async fn classify(
    conn: &dyn Connection,
    schema: &str,
    routine: &str,
    nargs: usize,
) -> Result<RoutineShape> {
    let not_found = || PgProcError::ProcedureNotFound {
        schema: schema.to_string(),
        name: routine.to_string(),
        nargs,
    };

    match lookup_scalar(conn, schema, routine, nargs).await {
        Ok(Some(shape)) => {
            tracing::debug!(shape = shape.describe(), "classified routine");
            return Ok(shape);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "scalar return lookup failed");
            return Err(not_found());
        }
    }

    match lookup_composite(conn, schema, routine, nargs).await {
        Ok(Some(shape)) => {
            tracing::debug!(
                shape = shape.describe(),
                fields = shape.field_names().len(),
                "classified routine"
            );
            Ok(shape)
        }
        Ok(None) => {
            tracing::debug!("routine not found in catalog");
            Err(not_found())
        }
        Err(e) => {
            tracing::warn!(error = %e, "composite return lookup failed");
            Err(not_found())
        }
    }
}

#[cfg(test)]
mod tests;
