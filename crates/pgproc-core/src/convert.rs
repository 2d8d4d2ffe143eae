//! Driver-level conversion of decoded values into Rust destination types.
//!
//! A routine's declared return type and the caller's destination type do not
//! have to agree exactly: an `integer` routine may fill a `String` slot, a
//! `numeric` routine may fill an `f32`. The rules here follow what a generic
//! SQL row scanner accepts: numbers widen and narrow with range checks, text
//! parses when unambiguous, everything with a textual form converts to
//! `String`. `NULL` only converts into `Option<T>` (or `Value`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use crate::{PgProcError, Result, Value};

/// Conversion from a decoded database value
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

/// Accepts anything; used for routines returning `void`
impl FromValue for () {
    fn from_value(_: &Value) -> Result<Self> {
        Ok(())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => match value.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(PgProcError::conversion(value, "bool")),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "yes" | "on" => Ok(true),
                "f" | "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(PgProcError::conversion(value, "bool")),
            },
            _ => Err(PgProcError::conversion(value, "bool")),
        }
    }
}

macro_rules! integer_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide: i64 = match value {
                        Value::Int16(v) => *v as i64,
                        Value::Int32(v) => *v as i64,
                        Value::Int64(v) => *v,
                        Value::Decimal(s) | Value::String(s) => s
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| PgProcError::conversion(value, stringify!($ty)))?,
                        _ => return Err(PgProcError::conversion(value, stringify!($ty))),
                    };
                    <$ty>::try_from(wide).map_err(|_| {
                        PgProcError::Conversion(format!(
                            "value {} out of range for {}",
                            wide,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

integer_from_value!(i16, i32, i64);

macro_rules! float_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    match value {
                        Value::Int16(v) => Ok(*v as $ty),
                        Value::Int32(v) => Ok(*v as $ty),
                        Value::Int64(v) => Ok(*v as $ty),
                        Value::Float32(v) => Ok(*v as $ty),
                        Value::Float64(v) => Ok(*v as $ty),
                        Value::Decimal(s) | Value::String(s) => s
                            .trim()
                            .parse::<$ty>()
                            .map_err(|_| PgProcError::conversion(value, stringify!($ty))),
                        _ => Err(PgProcError::conversion(value, stringify!($ty))),
                    }
                }
            }
        )*
    };
}

float_from_value!(f32, f64);

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(PgProcError::conversion(value, "String")),
            Value::String(s) | Value::Decimal(s) => Ok(s.clone()),
            Value::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|_| PgProcError::conversion(value, "String"))
            }
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(PgProcError::conversion(value, "Vec<u8>")),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(*v),
            Value::String(s) => {
                Uuid::parse_str(s.trim()).map_err(|_| PgProcError::conversion(value, "Uuid"))
            }
            _ => Err(PgProcError::conversion(value, "Uuid")),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Date(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.date()),
            Value::DateTimeUtc(v) => Ok(v.date_naive()),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| PgProcError::conversion(value, "NaiveDate")),
            _ => Err(PgProcError::conversion(value, "NaiveDate")),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Time(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.time()),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map_err(|_| PgProcError::conversion(value, "NaiveTime")),
            _ => Err(PgProcError::conversion(value, "NaiveTime")),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(*v),
            Value::DateTimeUtc(v) => Ok(v.naive_utc()),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|_| PgProcError::conversion(value, "NaiveDateTime")),
            _ => Err(PgProcError::conversion(value, "NaiveDateTime")),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::DateTimeUtc(v) => Ok(*v),
            Value::DateTime(v) => Ok(v.and_utc()),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN).and_utc()),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| PgProcError::conversion(value, "DateTime<Utc>")),
            _ => Err(PgProcError::conversion(value, "DateTime<Utc>")),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| PgProcError::Conversion(format!("invalid JSON text: {}", e))),
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(v) => Ok(serde_json::Value::Bool(*v)),
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                Ok(value.as_i64().map(serde_json::Value::from).unwrap_or_default())
            }
            _ => Err(PgProcError::conversion(value, "serde_json::Value")),
        }
    }
}

macro_rules! array_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for Vec<$ty> {
                fn from_value(value: &Value) -> Result<Self> {
                    match value {
                        Value::Array(items) => items.iter().map(<$ty>::from_value).collect(),
                        _ => Err(PgProcError::conversion(value, concat!("Vec<", stringify!($ty), ">"))),
                    }
                }
            }
        )*
    };
}

array_from_value!(String, i16, i32, i64, f64, bool);
