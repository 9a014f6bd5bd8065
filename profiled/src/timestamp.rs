use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

const NANOS_PER_MILLI: i128 = 1_000_000;

/// Portable point in time: Unix milliseconds, ordered numerically and
/// serialized as an RFC 3339 UTC string with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / NANOS_PER_MILLI) as i64)
    }

    pub fn from_unix_parts(seconds: i64, nanos: i64) -> Self {
        Self(
            seconds
                .saturating_mul(1000)
                .saturating_add(nanos.div_euclid(1_000_000)),
        )
    }

    pub fn parse_rfc3339(value: &str) -> Result<Self, time::error::Parse> {
        let parsed = OffsetDateTime::parse(value.trim(), &Rfc3339)?;
        Ok(Self((parsed.unix_timestamp_nanos() / NANOS_PER_MILLI) as i64))
    }

    /// Smallest timestamp that is both `>= self` and strictly after `previous`.
    pub fn at_least_after(self, previous: Option<Timestamp>) -> Self {
        match previous {
            Some(previous) if previous >= self => Self(previous.0.saturating_add(1)),
            _ => self,
        }
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        let dt =
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * NANOS_PER_MILLI).ok()?;
        if dt.year() < 0 {
            return None;
        }
        dt.format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .ok()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_rfc3339() {
            Some(text) => serializer.serialize_str(&text),
            None => serializer.serialize_i64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

struct TimestampVisitor;

impl Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an RFC 3339 string or Unix milliseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Timestamp, E> {
        Timestamp::parse_rfc3339(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Timestamp, E> {
        Ok(Timestamp(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Timestamp, E> {
        i64::try_from(value)
            .map(Timestamp)
            .map_err(|_| E::custom("timestamp out of range"))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Timestamp, E> {
        if value.is_finite() {
            Ok(Timestamp(value as i64))
        } else {
            Err(E::custom("timestamp is not finite"))
        }
    }
}
