//! Infinite timestamps and dates.
//!
//! postgres-types decodes `infinity` and `-infinity` into the `PosInfinity`
//! and `NegInfinity` variants of [`Timestamp`] and [`Date`]. chrono has no
//! such values, so they are mapped onto the configured [`TimestampSentinels`]
//! and a parameter equal to a sentinel is written back as the infinite value.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pgproc_core::TimestampSentinels;
use postgres_types::{Date, IsNull, Timestamp, ToSql, Type};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Which end of the time line an infinite value points to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Infinity {
    Negative,
    Positive,
}

fn sentinel(sentinels: &TimestampSentinels, inf: Infinity) -> NaiveDateTime {
    match inf {
        Infinity::Negative => sentinels.negative_infinity,
        Infinity::Positive => sentinels.infinity,
    }
}

/// A decoded temporal value whose infinities become sentinels
pub(crate) trait ResolveInfinity {
    type Output;

    fn resolve(self, sentinels: &TimestampSentinels) -> Self::Output;
}

impl ResolveInfinity for Timestamp<NaiveDateTime> {
    type Output = NaiveDateTime;

    fn resolve(self, sentinels: &TimestampSentinels) -> NaiveDateTime {
        match self {
            Timestamp::Value(v) => v,
            Timestamp::PosInfinity => sentinel(sentinels, Infinity::Positive),
            Timestamp::NegInfinity => sentinel(sentinels, Infinity::Negative),
        }
    }
}

impl ResolveInfinity for Timestamp<DateTime<Utc>> {
    type Output = DateTime<Utc>;

    fn resolve(self, sentinels: &TimestampSentinels) -> DateTime<Utc> {
        match self {
            Timestamp::Value(v) => v,
            Timestamp::PosInfinity => sentinel(sentinels, Infinity::Positive).and_utc(),
            Timestamp::NegInfinity => sentinel(sentinels, Infinity::Negative).and_utc(),
        }
    }
}

impl ResolveInfinity for Date<NaiveDate> {
    type Output = NaiveDate;

    fn resolve(self, sentinels: &TimestampSentinels) -> NaiveDate {
        match self {
            Date::Value(v) => v,
            Date::PosInfinity => sentinel(sentinels, Infinity::Positive).date(),
            Date::NegInfinity => sentinel(sentinels, Infinity::Negative).date(),
        }
    }
}

/// Which infinity, if any, a timestamp parameter stands for
pub(crate) fn infinity_of(sentinels: &TimestampSentinels, ts: NaiveDateTime) -> Option<Infinity> {
    if ts == sentinels.infinity {
        Some(Infinity::Positive)
    } else if ts == sentinels.negative_infinity {
        Some(Infinity::Negative)
    } else {
        None
    }
}

/// Which infinity, if any, a date parameter stands for
pub(crate) fn infinity_of_date(sentinels: &TimestampSentinels, date: NaiveDate) -> Option<Infinity> {
    infinity_of(sentinels, date.and_time(NaiveTime::MIN))
}

/// Write an infinite value in the binary format of `ty`
pub(crate) fn write_infinity(inf: Infinity, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let positive = inf == Infinity::Positive;
    if *ty == Type::TIMESTAMP {
        let value = if positive {
            Timestamp::<NaiveDateTime>::PosInfinity
        } else {
            Timestamp::<NaiveDateTime>::NegInfinity
        };
        value.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        let value = if positive {
            Timestamp::<DateTime<Utc>>::PosInfinity
        } else {
            Timestamp::<DateTime<Utc>>::NegInfinity
        };
        value.to_sql(ty, out)
    } else if *ty == Type::DATE {
        let value = if positive {
            Date::<NaiveDate>::PosInfinity
        } else {
            Date::<NaiveDate>::NegInfinity
        };
        value.to_sql(ty, out)
    } else {
        Err(format!("cannot encode infinity as {}", ty).into())
    }
}

#[cfg(test)]
mod tests;
