//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::StreamExt;
use pgproc_core::{
    Connection, ConnectionConfig, PgProcError, QueryResult, Result, Row, RowStream,
    SslMode, TimestampSentinels, Value,
};
use postgres_types::{Date, IsNull, Kind, Timestamp};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_postgres::{
    Client, NoTls, Row as PgRow, Statement,
    types::{FromSql, ToSql, Type},
};

use crate::numeric::{self, PgNumericString};
use crate::timestamp::{self, Infinity, ResolveInfinity};
use crate::tls::build_connector;

type BoxError = Box<dyn std::error::Error + Sync + Send>;

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail() {
        if !detail.trim().is_empty() {
            message.push_str(&format!(" (detail: {})", detail));
        }
    }

    if let Some(hint) = db_error.hint() {
        if !hint.trim().is_empty() {
            message.push_str(&format!(" (hint: {})", hint));
        }
    }

    match code.code() {
        "42883" => format!("undefined function: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        "22003" => format!("numeric value out of range: {}", message),
        "P0001" => format!("raised exception: {}", message),
        _ => format!("{} (code: {})", message, code.code()),
    }
}

/// Build the tokio-postgres configuration for a `ConnectionConfig`
pub fn to_pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.effective_port())
        .dbname(&config.database);

    if let Some(user) = &config.username {
        pg_config.user(user);
    }
    if let Some(password) = &config.password {
        pg_config.password(password);
    }
    if let Some(name) = &config.application_name {
        pg_config.application_name(name);
    }
    if config.connect_timeout_secs > 0 {
        pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));
    }

    // Certificate checks for verify-ca/verify-full happen in the connector.
    pg_config.ssl_mode(match config.ssl_mode {
        SslMode::Disable => tokio_postgres::config::SslMode::Disable,
        SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            tokio_postgres::config::SslMode::Require
        }
    });
    pg_config
}

fn ssl_mode_of(pg_config: &tokio_postgres::Config) -> SslMode {
    match pg_config.get_ssl_mode() {
        tokio_postgres::config::SslMode::Disable => SslMode::Disable,
        tokio_postgres::config::SslMode::Prefer => SslMode::Prefer,
        _ => SslMode::Require,
    }
}

fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "PostgreSQL connection error");
        }
    });
}

/// PostgreSQL connection wrapper
///
/// Statements run on a single `Client`; tokio-postgres pipelines concurrent
/// requests over the one socket, so the client is shared without a lock.
pub struct PostgresConnection {
    client: Client,
    sentinels: TimestampSentinels,
}

impl PostgresConnection {
    /// Connect using a `ConnectionConfig`
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        tracing::info!(
            url = %config.display_url(),
            ssl_mode = config.ssl_mode.as_str(),
            "connecting to PostgreSQL database"
        );
        Self::establish(
            to_pg_config(config),
            config.ssl_mode,
            config.ssl_ca_cert.as_deref(),
            config.sentinels,
        )
        .await
    }

    /// Connect using a libpq-style connection string
    /// (`host=localhost user=postgres` or `postgresql://...`)
    pub async fn connect_conninfo(conninfo: &str, sentinels: TimestampSentinels) -> Result<Self> {
        let pg_config: tokio_postgres::Config = conninfo
            .parse()
            .map_err(|e| PgProcError::Configuration(format!("invalid connection string: {}", e)))?;
        let ssl_mode = ssl_mode_of(&pg_config);
        tracing::info!(ssl_mode = ssl_mode.as_str(), "connecting to PostgreSQL database");
        Self::establish(pg_config, ssl_mode, None, sentinels).await
    }

    async fn establish(
        pg_config: tokio_postgres::Config,
        ssl_mode: SslMode,
        ssl_ca_cert: Option<&str>,
        sentinels: TimestampSentinels,
    ) -> Result<Self> {
        let client = if ssl_mode == SslMode::Disable {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
                PgProcError::Connection(format!(
                    "Failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;
            spawn_connection(connection);
            client
        } else {
            let tls = build_connector(ssl_mode, ssl_ca_cert)?;
            let (client, connection) = pg_config.connect(tls).await.map_err(|e| {
                PgProcError::Connection(format!(
                    "Failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;
            spawn_connection(connection);
            client
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self { client, sentinels })
    }

    /// The infinity markers used by this connection
    pub fn sentinels(&self) -> &TimestampSentinels {
        &self.sentinels
    }

    /// Run one or more `;`-separated statements without parameters
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await.map_err(|e| {
            PgProcError::Driver(format!(
                "Failed to execute batch: {}",
                format_postgres_error(&e)
            ))
        })
    }

    async fn prepare(&self, sql: &str, params: &[Value]) -> Result<(Statement, Vec<PgValue>)> {
        let statement = self.client.prepare(sql).await.map_err(|e| {
            PgProcError::Driver(format!(
                "Failed to prepare statement: {}",
                format_postgres_error(&e)
            ))
        })?;

        let param_types = statement.params();
        let pg_params = params
            .iter()
            .enumerate()
            .map(|(i, value)| match param_types.get(i) {
                Some(target_type) => PgValue::for_type(value, target_type, &self.sentinels),
                None => Ok(PgValue::from_value(value)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((statement, pg_params))
    }
}

/// Owned parameter value handed to tokio-postgres
#[derive(Debug, PartialEq)]
enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Infinite(Infinity),
    Array(Vec<PgValue>),
}

#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

impl PgValue {
    /// Convert a `Value` into the PgValue matching the parameter's declared
    /// type, so tokio-postgres writes the right binary width and format.
    fn for_type(value: &Value, target_type: &Type, sentinels: &TimestampSentinels) -> Result<Self> {
        let coerced = match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) if is_text(target_type) => PgValue::String(v.to_string()),
            Value::Bool(v) => PgValue::Bool(*v),

            Value::Int16(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int64(v) => Self::coerce_int(*v, target_type)?,

            Value::Float32(v) => Self::coerce_float(*v as f64, target_type),
            Value::Float64(v) => Self::coerce_float(*v, target_type),

            Value::Decimal(v) => match *target_type {
                Type::FLOAT4 | Type::FLOAT8 => {
                    let parsed = v.parse::<f64>().map_err(|_| {
                        PgProcError::Conversion(format!("invalid numeric literal: {}", v))
                    })?;
                    Self::coerce_float(parsed, target_type)
                }
                _ if is_text(target_type) => PgValue::String(v.clone()),
                _ => PgValue::Numeric(v.clone()),
            },
            Value::String(v) => Self::coerce_string(v, target_type)?,
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) if is_text(target_type) => PgValue::String(v.to_string()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Time(v) => PgValue::Time(*v),

            Value::DateTime(v) if is_text(target_type) => PgValue::String(v.to_string()),
            Value::DateTimeUtc(v) if is_text(target_type) => PgValue::String(v.to_rfc3339()),
            Value::Date(v) if is_text(target_type) => PgValue::String(v.to_string()),
            Value::DateTime(v) => match timestamp::infinity_of(sentinels, *v) {
                Some(inf) => PgValue::Infinite(inf),
                None if *target_type == Type::TIMESTAMPTZ => PgValue::DateTimeUtc(v.and_utc()),
                None if *target_type == Type::DATE => PgValue::Date(v.date()),
                None => PgValue::DateTime(*v),
            },
            Value::DateTimeUtc(v) => match timestamp::infinity_of(sentinels, v.naive_utc()) {
                Some(inf) => PgValue::Infinite(inf),
                None if *target_type == Type::TIMESTAMP => PgValue::DateTime(v.naive_utc()),
                None => PgValue::DateTimeUtc(*v),
            },
            Value::Date(v) => match timestamp::infinity_of_date(sentinels, *v) {
                Some(inf) => PgValue::Infinite(inf),
                None if *target_type == Type::TIMESTAMP => {
                    PgValue::DateTime(v.and_time(NaiveTime::MIN))
                }
                None => PgValue::Date(*v),
            },

            Value::Array(items) => match target_type.kind() {
                Kind::Array(member) => PgValue::Array(
                    items
                        .iter()
                        .map(|item| Self::for_type(item, member, sentinels))
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => PgValue::String(value.to_string()),
            },
        };
        Ok(coerced)
    }

    /// Pick the integer width of the target type. Values that do not fit
    /// are rejected instead of truncated.
    fn coerce_int(value: i64, target_type: &Type) -> Result<Self> {
        let out_of_range = || {
            PgProcError::Conversion(format!("{} is out of range for {}", value, target_type))
        };
        Ok(match *target_type {
            Type::INT2 => PgValue::Int16(i16::try_from(value).map_err(|_| out_of_range())?),
            Type::INT4 => PgValue::Int32(i32::try_from(value).map_err(|_| out_of_range())?),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            _ if is_text(target_type) => PgValue::String(value.to_string()),
            _ => PgValue::Int64(value),
        })
    }

    fn coerce_float(value: f64, target_type: &Type) -> Self {
        match *target_type {
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            _ if is_text(target_type) => PgValue::String(value.to_string()),
            _ => PgValue::Float64(value),
        }
    }

    /// Parse text into the target type when the statement declares one
    fn coerce_string(value: &str, target_type: &Type) -> Result<Self> {
        let invalid = || {
            PgProcError::Conversion(format!("cannot convert text {:?} into {}", value, target_type))
        };

        let coerced = match *target_type {
            Type::INT2 | Type::INT4 | Type::INT8 => {
                let parsed = value.trim().parse::<i64>().map_err(|_| invalid())?;
                return Self::coerce_int(parsed, target_type);
            }
            Type::FLOAT4 | Type::FLOAT8 => {
                let parsed = value.trim().parse::<f64>().map_err(|_| invalid())?;
                Self::coerce_float(parsed, target_type)
            }
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            Type::BOOL => match value.trim().to_lowercase().as_str() {
                "t" | "true" | "yes" | "on" | "1" => PgValue::Bool(true),
                "f" | "false" | "no" | "off" | "0" => PgValue::Bool(false),
                _ => return Err(invalid()),
            },
            Type::UUID => PgValue::Uuid(uuid::Uuid::parse_str(value.trim()).map_err(|_| invalid())?),
            Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| PgValue::String(value.to_string())),
            Type::DATE => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| PgValue::String(value.to_string())),
            Type::TIME => NaiveTime::parse_from_str(value, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
                .map(PgValue::Time)
                .unwrap_or_else(|_| PgValue::String(value.to_string())),
            Type::TIMESTAMP => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(value, "%Y-%m-%d")
                        .ok()
                        .map(|date| date.and_time(NaiveTime::MIN))
                })
                .map(PgValue::DateTime)
                .unwrap_or_else(|| PgValue::String(value.to_string())),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .or_else(|| {
                    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|timestamp| timestamp.and_utc())
                })
                .map(PgValue::DateTimeUtc)
                .unwrap_or_else(|| PgValue::String(value.to_string())),
            _ => PgValue::String(value.to_string()),
        };
        Ok(coerced)
    }

    /// Fallback used when the statement declares fewer parameters than given.
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) => PgValue::Numeric(v.clone()),
            Value::String(v) => PgValue::String(v.clone()),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(items) => PgValue::Array(items.iter().map(Self::from_value).collect()),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::Numeric(v) => numeric::encode(v, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => v.to_sql(ty, out),
            PgValue::Uuid(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql(ty, out),
            PgValue::Date(v) => v.to_sql(ty, out),
            PgValue::Time(v) => v.to_sql(ty, out),
            PgValue::DateTime(v) => v.to_sql(ty, out),
            PgValue::Infinite(inf) => timestamp::write_infinity(*inf, ty, out),
            PgValue::Array(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

fn decode<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        PgProcError::Conversion(format!(
            "failed to decode column {}: {}",
            row.columns()[idx].name(),
            e
        ))
    })
}

fn decode_array<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Result<Value>
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    Ok(decode::<Vec<Option<T>>>(row, idx)?
        .map(|items| {
            Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map(&wrap).unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .unwrap_or(Value::Null))
}

/// Convert a PostgreSQL row value to a `Value`, mapping infinite timestamps
/// and dates onto the sentinels.
fn postgres_to_value(row: &PgRow, idx: usize, sentinels: &TimestampSentinels) -> Result<Value> {
    let col = &row.columns()[idx];
    let type_name = col.type_().name();

    let value = match type_name {
        "void" => None,
        "bool" => decode::<bool>(row, idx)?.map(Value::Bool),
        "char" => decode::<i8>(row, idx)?.map(|v| Value::Int16(v as i16)),
        "int2" => decode::<i16>(row, idx)?.map(Value::Int16),
        "int4" => decode::<i32>(row, idx)?.map(Value::Int32),
        "int8" => decode::<i64>(row, idx)?.map(Value::Int64),
        "oid" => decode::<u32>(row, idx)?.map(|v| Value::Int64(v as i64)),
        "float4" => decode::<f32>(row, idx)?.map(Value::Float32),
        "float8" => decode::<f64>(row, idx)?.map(Value::Float64),
        "numeric" => decode::<PgNumericString>(row, idx)?.map(|v| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" => decode::<String>(row, idx)?.map(Value::String),
        "bytea" => decode::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        "uuid" => decode::<uuid::Uuid>(row, idx)?.map(Value::Uuid),
        "json" | "jsonb" => decode::<serde_json::Value>(row, idx)?.map(Value::Json),
        "time" => decode::<NaiveTime>(row, idx)?.map(Value::Time),
        "date" => decode::<Date<NaiveDate>>(row, idx)?
            .map(|v| Value::Date(v.resolve(sentinels))),
        "timestamp" => decode::<Timestamp<NaiveDateTime>>(row, idx)?
            .map(|v| Value::DateTime(v.resolve(sentinels))),
        "timestamptz" => decode::<Timestamp<DateTime<Utc>>>(row, idx)?
            .map(|v| Value::DateTimeUtc(v.resolve(sentinels))),
        // Array types - PostgreSQL prefixes array type names with underscore
        "_text" | "_varchar" | "_bpchar" | "_name" => {
            return decode_array::<String, _>(row, idx, Value::String);
        }
        "_bool" => return decode_array::<bool, _>(row, idx, Value::Bool),
        "_int2" => return decode_array::<i16, _>(row, idx, Value::Int16),
        "_int4" => return decode_array::<i32, _>(row, idx, Value::Int32),
        "_int8" => return decode_array::<i64, _>(row, idx, Value::Int64),
        "_float4" => return decode_array::<f32, _>(row, idx, Value::Float32),
        "_float8" => return decode_array::<f64, _>(row, idx, Value::Float64),
        "_numeric" => {
            return decode_array::<PgNumericString, _>(row, idx, |v| Value::Decimal(v.0));
        }
        // Enums and other custom types send their text form.
        _ => decode::<PgFallbackString>(row, idx)?.map(|v| Value::String(v.0)),
    };

    Ok(value.unwrap_or(Value::Null))
}

fn convert_row(
    pg_row: &PgRow,
    column_names: &[String],
    sentinels: &TimestampSentinels,
) -> Result<Row> {
    let values = (0..pg_row.len())
        .map(|idx| postgres_to_value(pg_row, idx, sentinels))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(column_names.to_vec(), values))
}

fn column_names(statement: &Statement) -> Vec<String> {
    statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let (statement, pg_params) = self.prepare(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = self
            .client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| {
                PgProcError::Driver(format!(
                    "Failed to execute query: {}",
                    format_postgres_error(&e)
                ))
            })?;

        let names = column_names(&statement);

        let rows = pg_rows
            .iter()
            .map(|pg_row| convert_row(pg_row, &names, &self.sentinels))
            .collect::<Result<Vec<_>>>()?;

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult { rows })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query_stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let (statement, pg_params) = self.prepare(sql, params).await?;
        let names = column_names(&statement);
        let sentinels = self.sentinels;

        let pg_stream = self
            .client
            .query_raw(&statement, pg_params)
            .await
            .map_err(|e| {
                PgProcError::Driver(format!(
                    "Failed to execute query: {}",
                    format_postgres_error(&e)
                ))
            })?;

        tracing::debug!("row stream opened");
        Ok(pg_stream
            .map(move |item| match item {
                Ok(pg_row) => convert_row(&pg_row, &names, &sentinels),
                Err(e) => Err(PgProcError::Driver(format!(
                    "Failed to fetch row: {}",
                    format_postgres_error(&e)
                ))),
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests;
