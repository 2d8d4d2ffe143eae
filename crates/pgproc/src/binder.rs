//! Result Binder
//!
//! Moves the columns of a result row into the caller's destination: a single
//! scalar slot, a record matched by member name, or a set sink fed one
//! element per row.

use pgproc_core::{FromValue, PgProcError, Result, Row, Value};

use crate::record::Record;
use crate::sink::{RecordSink, ScalarSink};

/// A slot receiving a single scalar result
pub trait ScalarTarget: Send {
    fn set(&mut self, value: &Value) -> Result<()>;
}

impl<T: FromValue + Send> ScalarTarget for T {
    fn set(&mut self, value: &Value) -> Result<()> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// A record receiving a single composite result
pub trait RecordTarget: Send {
    fn members(&self) -> &'static [&'static str];
    fn record_name(&self) -> &'static str;
    fn assign(&mut self, member: usize, value: &Value) -> Result<()>;
}

impl<R: Record> RecordTarget for R {
    fn members(&self) -> &'static [&'static str] {
        R::MEMBERS
    }

    fn record_name(&self) -> &'static str {
        R::record_name()
    }

    fn assign(&mut self, member: usize, value: &Value) -> Result<()> {
        Record::assign(self, member, value)
    }
}

/// Capitalize the first letter of every word. Letters, digits and `_` are
/// word characters, so `first_name` becomes `First_name`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

fn member_matches(column: &str, member: &str) -> bool {
    let member = member.strip_prefix("r#").unwrap_or(member);
    title_case(column).to_lowercase() == member.to_lowercase()
}

/// Column-to-member mapping for one composite shape and one record type.
///
/// Columns are visited in catalog order; each resolves to its member on its
/// own, so the record's declaration order is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    slots: Vec<usize>,
}

impl BindingPlan {
    /// Match every catalog field to a member of `record_name`. A field with
    /// no matching member is a `BindMismatch`.
    pub fn resolve<S: AsRef<str>>(
        field_names: &[S],
        members: &[&str],
        record_name: &'static str,
    ) -> Result<Self> {
        let slots = field_names
            .iter()
            .map(|field| {
                let field = field.as_ref();
                members
                    .iter()
                    .position(|member| member_matches(field, member))
                    .ok_or_else(|| PgProcError::BindMismatch {
                        field: field.to_string(),
                        record: record_name,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    /// Plan for a `Record` type
    pub fn for_record<R: Record, S: AsRef<str>>(field_names: &[S]) -> Result<Self> {
        Self::resolve(field_names, R::MEMBERS, R::record_name())
    }

    /// Member index bound to each column, in column order
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Scan a whole row into `target`
    pub fn apply(&self, row: &Row, target: &mut dyn RecordTarget) -> Result<()> {
        if row.len() != self.slots.len() {
            return Err(PgProcError::Driver(format!(
                "row has {} columns ({}) but {} fields were resolved",
                row.len(),
                row.columns().join(", "),
                self.slots.len()
            )));
        }
        for (value, member) in row.values.iter().zip(&self.slots) {
            target.assign(*member, value)?;
        }
        Ok(())
    }

    /// Scan a row into a fresh `R`
    pub fn build<R: Record>(&self, row: &Row) -> Result<R> {
        let mut record = R::default();
        self.apply(row, &mut record)?;
        Ok(record)
    }
}

fn single_value(row: &Row) -> Result<&Value> {
    match row.values.as_slice() {
        [value] => Ok(value),
        values => Err(PgProcError::Driver(format!(
            "expected one column for a scalar result, got {}",
            values.len()
        ))),
    }
}

/// Scalar, single: store the row's only value
pub fn bind_scalar(row: &Row, target: &mut dyn ScalarTarget) -> Result<()> {
    target.set(single_value(row)?)
}

/// Composite, single: store every column through the plan
pub fn bind_record(row: &Row, plan: &BindingPlan, target: &mut dyn RecordTarget) -> Result<()> {
    plan.apply(row, target)
}

/// Scalar, set: convert the row's value and hand it to the sink
pub async fn push_scalar(row: &Row, sink: &mut dyn ScalarSink) -> Result<()> {
    sink.push(single_value(row)?).await
}

/// Composite, set: build a fresh record from the row and hand it to the sink
pub async fn push_record(row: &Row, plan: &BindingPlan, sink: &mut dyn RecordSink) -> Result<()> {
    sink.push(row, plan).await
}
