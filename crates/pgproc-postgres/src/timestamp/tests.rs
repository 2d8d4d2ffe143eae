//! Tests for infinite timestamp handling

use super::*;
use postgres_types::FromSql;
use pretty_assertions::assert_eq;

fn sentinels() -> TimestampSentinels {
    TimestampSentinels::default()
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn test_decode_positive_infinity_timestamp() {
    let raw = i64::MAX.to_be_bytes();
    let decoded = Timestamp::<NaiveDateTime>::from_sql(&Type::TIMESTAMP, &raw).unwrap();
    assert_eq!(decoded, Timestamp::PosInfinity);
    assert_eq!(decoded.resolve(&sentinels()), sentinels().infinity);
}

#[test]
fn test_decode_negative_infinity_timestamptz() {
    let raw = i64::MIN.to_be_bytes();
    let decoded = Timestamp::<DateTime<Utc>>::from_sql(&Type::TIMESTAMPTZ, &raw).unwrap();
    assert_eq!(
        decoded.resolve(&sentinels()),
        sentinels().negative_infinity.and_utc()
    );
}

#[test]
fn test_decode_finite_timestamp() {
    // One day after the PostgreSQL epoch (2000-01-01).
    let raw = 86_400_000_000_i64.to_be_bytes();
    let decoded = Timestamp::<NaiveDateTime>::from_sql(&Type::TIMESTAMP, &raw).unwrap();
    assert_eq!(decoded.resolve(&sentinels()), midnight(2000, 1, 2));
}

#[test]
fn test_decode_infinite_date() {
    let raw = i32::MAX.to_be_bytes();
    let decoded = Date::<NaiveDate>::from_sql(&Type::DATE, &raw).unwrap();
    assert_eq!(decoded.resolve(&sentinels()), sentinels().infinity.date());

    let raw = i32::MIN.to_be_bytes();
    let decoded = Date::<NaiveDate>::from_sql(&Type::DATE, &raw).unwrap();
    assert_eq!(
        decoded.resolve(&sentinels()),
        sentinels().negative_infinity.date()
    );
}

#[test]
fn test_custom_sentinels_are_used() {
    let custom = TimestampSentinels::new(midnight(1900, 1, 1), midnight(3000, 1, 1)).unwrap();

    let raw = i64::MIN.to_be_bytes();
    let decoded = Timestamp::<NaiveDateTime>::from_sql(&Type::TIMESTAMP, &raw).unwrap();
    assert_eq!(decoded.resolve(&custom), midnight(1900, 1, 1));
}

#[test]
fn test_sentinel_parameters_encode_as_infinity() {
    let s = sentinels();
    assert_eq!(infinity_of(&s, s.infinity), Some(Infinity::Positive));
    assert_eq!(infinity_of(&s, s.negative_infinity), Some(Infinity::Negative));
    assert_eq!(infinity_of(&s, midnight(2024, 5, 17)), None);
    assert_eq!(infinity_of_date(&s, s.infinity.date()), Some(Infinity::Positive));

    let mut out = BytesMut::new();
    write_infinity(Infinity::Positive, &Type::TIMESTAMP, &mut out).unwrap();
    assert_eq!(&out[..], &i64::MAX.to_be_bytes()[..]);

    let mut out = BytesMut::new();
    write_infinity(Infinity::Negative, &Type::TIMESTAMPTZ, &mut out).unwrap();
    assert_eq!(&out[..], &i64::MIN.to_be_bytes()[..]);

    let mut out = BytesMut::new();
    write_infinity(Infinity::Negative, &Type::DATE, &mut out).unwrap();
    assert_eq!(&out[..], &i32::MIN.to_be_bytes()[..]);
}

#[test]
fn test_infinity_rejected_for_non_temporal_type() {
    let mut out = BytesMut::new();
    assert!(write_infinity(Infinity::Positive, &Type::INT4, &mut out).is_err());
    assert!(write_infinity(Infinity::Positive, &Type::TEXT, &mut out).is_err());
}

#[test]
fn test_round_trip_through_sentinel() {
    let s = sentinels();
    let mut out = BytesMut::new();
    let inf = infinity_of(&s, s.infinity).unwrap();
    write_infinity(inf, &Type::TIMESTAMP, &mut out).unwrap();

    let decoded = Timestamp::<NaiveDateTime>::from_sql(&Type::TIMESTAMP, &out).unwrap();
    assert_eq!(decoded.resolve(&s), s.infinity);
}
