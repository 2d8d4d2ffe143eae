//! Tests for parameter conversion and connection configuration

use super::*;
use pretty_assertions::assert_eq;

fn sentinels() -> TimestampSentinels {
    TimestampSentinels::default()
}

fn encode(value: &Value, ty: &Type) -> BytesMut {
    let mut out = BytesMut::new();
    PgValue::for_type(value, ty, &sentinels())
        .unwrap()
        .to_sql(ty, &mut out)
        .unwrap();
    out
}

#[test]
fn test_pg_config_from_connection_config() {
    let config = ConnectionConfig::new("db.internal", 0, "inventory")
        .username("app")
        .password("secret")
        .ssl_mode(SslMode::VerifyFull)
        .connect_timeout_secs(3);
    let pg_config = to_pg_config(&config);

    assert_eq!(
        pg_config.get_hosts(),
        &[tokio_postgres::config::Host::Tcp("db.internal".to_string())]
    );
    assert_eq!(pg_config.get_ports(), &[5432]);
    assert_eq!(pg_config.get_dbname(), Some("inventory"));
    assert_eq!(pg_config.get_user(), Some("app"));
    assert_eq!(pg_config.get_application_name(), Some("pgproc"));
    assert_eq!(pg_config.get_connect_timeout(), Some(&Duration::from_secs(3)));
    assert_eq!(
        pg_config.get_ssl_mode(),
        tokio_postgres::config::SslMode::Require
    );
}

#[test]
fn test_zero_timeout_is_not_set() {
    let config = ConnectionConfig::new("localhost", 5433, "postgres").connect_timeout_secs(0);
    let pg_config = to_pg_config(&config);
    assert_eq!(pg_config.get_connect_timeout(), None);
    assert_eq!(pg_config.get_ports(), &[5433]);
}

#[test]
fn test_ssl_mode_read_back_from_conninfo() {
    let pg_config: tokio_postgres::Config = "host=localhost sslmode=disable".parse().unwrap();
    assert_eq!(ssl_mode_of(&pg_config), SslMode::Disable);

    let pg_config: tokio_postgres::Config = "host=localhost sslmode=require".parse().unwrap();
    assert_eq!(ssl_mode_of(&pg_config), SslMode::Require);
}

#[test]
fn test_integers_take_the_declared_width() {
    let s = sentinels();
    assert_eq!(
        PgValue::for_type(&Value::Int64(7), &Type::INT4, &s).unwrap(),
        PgValue::Int32(7)
    );
    assert_eq!(
        PgValue::for_type(&Value::Int32(3), &Type::INT2, &s).unwrap(),
        PgValue::Int16(3)
    );
    assert_eq!(&encode(&Value::Int64(7), &Type::INT4)[..], &7_i32.to_be_bytes()[..]);
}

#[test]
fn test_integer_out_of_range_is_rejected() {
    let err = PgValue::for_type(&Value::Int64(70_000), &Type::INT2, &sentinels()).unwrap_err();
    assert!(matches!(err, PgProcError::Conversion(_)));
}

#[test]
fn test_text_parses_into_declared_type() {
    let s = sentinels();
    assert_eq!(
        PgValue::for_type(&Value::from("42"), &Type::INT4, &s).unwrap(),
        PgValue::Int32(42)
    );
    assert_eq!(
        PgValue::for_type(&Value::from("t"), &Type::BOOL, &s).unwrap(),
        PgValue::Bool(true)
    );
    assert_eq!(
        PgValue::for_type(&Value::from("2024-02-29"), &Type::DATE, &s).unwrap(),
        PgValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    );
    assert!(PgValue::for_type(&Value::from("forty"), &Type::INT4, &s).is_err());
}

#[test]
fn test_numbers_into_text_parameter() {
    let s = sentinels();
    assert_eq!(
        PgValue::for_type(&Value::Int32(5), &Type::TEXT, &s).unwrap(),
        PgValue::String("5".to_string())
    );
    assert_eq!(
        PgValue::for_type(&Value::Bool(false), &Type::VARCHAR, &s).unwrap(),
        PgValue::String("false".to_string())
    );
}

#[test]
fn test_numeric_parameter_uses_binary_numeric() {
    let out = encode(&Value::Decimal("12.375".to_string()), &Type::NUMERIC);
    let mut expected = BytesMut::new();
    numeric::encode("12.375", &mut expected).unwrap();
    assert_eq!(out, expected);

    assert_eq!(
        PgValue::for_type(&Value::Int32(12), &Type::NUMERIC, &sentinels()).unwrap(),
        PgValue::Numeric("12".to_string())
    );
}

#[test]
fn test_sentinel_timestamp_is_sent_as_infinity() {
    let s = sentinels();
    let out = encode(&Value::DateTime(s.infinity), &Type::TIMESTAMP);
    assert_eq!(&out[..], &i64::MAX.to_be_bytes()[..]);

    let out = encode(&Value::DateTimeUtc(s.negative_infinity.and_utc()), &Type::TIMESTAMPTZ);
    assert_eq!(&out[..], &i64::MIN.to_be_bytes()[..]);

    let out = encode(&Value::Date(s.infinity.date()), &Type::DATE);
    assert_eq!(&out[..], &i32::MAX.to_be_bytes()[..]);
}

#[test]
fn test_temporal_values_into_text_parameter() {
    let s = sentinels();
    assert_eq!(
        PgValue::for_type(&Value::DateTime(s.infinity), &Type::TEXT, &s).unwrap(),
        PgValue::String("9999-01-01 00:00:00".into())
    );

    let out = encode(&Value::DateTime(s.infinity), &Type::TEXT);
    assert_eq!(&out[..], b"9999-01-01 00:00:00");

    let day = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
    assert_eq!(
        PgValue::for_type(&Value::Date(day), &Type::VARCHAR, &s).unwrap(),
        PgValue::String("2024-05-17".into())
    );
    assert_eq!(
        PgValue::for_type(&Value::Date(s.negative_infinity.date()), &Type::TEXT, &s).unwrap(),
        PgValue::String("0000-01-01".into())
    );
}

#[test]
fn test_finite_timestamp_follows_target_type() {
    let ts = NaiveDate::from_ymd_opt(2021, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    assert_eq!(
        PgValue::for_type(&Value::DateTime(ts), &Type::TIMESTAMPTZ, &sentinels()).unwrap(),
        PgValue::DateTimeUtc(ts.and_utc())
    );
    assert_eq!(
        PgValue::for_type(&Value::DateTime(ts), &Type::DATE, &sentinels()).unwrap(),
        PgValue::Date(ts.date())
    );
}

#[test]
fn test_array_elements_follow_member_type() {
    let value = Value::Array(vec![Value::Int64(1), Value::Null, Value::Int64(3)]);
    assert_eq!(
        PgValue::for_type(&value, &Type::INT4_ARRAY, &sentinels()).unwrap(),
        PgValue::Array(vec![PgValue::Int32(1), PgValue::Null, PgValue::Int32(3)])
    );
}

#[test]
fn test_array_into_scalar_parameter_uses_literal() {
    let value = Value::Array(vec![Value::Int32(1), Value::Int32(2)]);
    assert_eq!(
        PgValue::for_type(&value, &Type::TEXT, &sentinels()).unwrap(),
        PgValue::String("{1,2}".to_string())
    );
}

#[test]
fn test_null_writes_sql_null() {
    let mut out = BytesMut::new();
    let is_null = PgValue::Null.to_sql(&Type::INT4, &mut out).unwrap();
    assert!(matches!(is_null, IsNull::Yes));
    assert!(out.is_empty());
}
