//! Timestamp value with a compact UTC-nanosecond wire form

use crate::error::ExtensionError;
use crate::extension::{self, Extensible, Extension, WireKind, WireValue};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in time with its original UTC offset
///
/// Equality and ordering compare the instant only, so a timestamp that lost
/// its offset through [`TimestampExtension`] still equals the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<FixedOffset>);

impl Timestamp {
    /// Current time in UTC
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Timestamp from nanoseconds since the Unix epoch, in UTC
    pub fn from_unix_nanos(nanos: i64) -> Self {
        let secs = nanos.div_euclid(NANOS_PER_SEC);
        let subsec = nanos.rem_euclid(NANOS_PER_SEC) as u32;
        // Every i64 nanosecond count is inside chrono's range
        let utc = DateTime::from_timestamp(secs, subsec).unwrap_or_default();
        Self::from(utc)
    }

    /// Nanoseconds since the Unix epoch, `None` outside roughly 1677..2262
    pub fn unix_nanos(&self) -> Option<i64> {
        self.0.timestamp_nanos_opt()
    }

    /// Offset from UTC in seconds
    pub fn offset_seconds(&self) -> i32 {
        self.0.offset().local_minus_utc()
    }

    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Structural form, used when no extension is registered
#[derive(Serialize, Deserialize)]
#[serde(rename = "Timestamp")]
struct Fields {
    secs: i64,
    nanos: u32,
    offset_secs: i32,
}

impl Extensible for Timestamp {
    fn serialize_structural<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Fields {
            secs: self.0.timestamp(),
            nanos: self.0.timestamp_subsec_nanos(),
            offset_secs: self.offset_seconds(),
        }
        .serialize(serializer)
    }

    fn deserialize_structural<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::deserialize(deserializer)?;
        let offset = FixedOffset::east_opt(fields.offset_secs)
            .ok_or_else(|| D::Error::custom(format!("invalid UTC offset: {}s", fields.offset_secs)))?;
        let utc = DateTime::from_timestamp(fields.secs, fields.nanos)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}s", fields.secs)))?;
        Ok(Self(offset.from_utc_datetime(&utc.naive_utc())))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        extension::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        extension::deserialize(deserializer)
    }
}

/// Writes a [`Timestamp`] as signed nanoseconds since the Unix epoch, UTC
///
/// The offset is dropped; decoded timestamps are in UTC. Instants that do
/// not fit an i64 nanosecond count fail to encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampExtension;

impl Extension for TimestampExtension {
    type Target = Timestamp;

    fn wire_kind(&self) -> WireKind {
        WireKind::Int
    }

    fn to_wire(&self, value: &Timestamp) -> Result<WireValue, ExtensionError> {
        value
            .unix_nanos()
            .map(WireValue::Int)
            .ok_or(ExtensionError::OutOfRange {
                type_name: "Timestamp",
            })
    }

    fn from_wire(&self, wire: WireValue) -> Result<Timestamp, ExtensionError> {
        match wire {
            WireValue::Int(nanos) => Ok(Timestamp::from_unix_nanos(nanos)),
            other => Err(ExtensionError::UnexpectedWire {
                expected: WireKind::Int,
                actual: other.kind(),
            }),
        }
    }
}
