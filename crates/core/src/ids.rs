//! Strongly-typed identifiers used across the pipeline.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Opaque 64-bit event identifier.
///
/// Encodes a timestamp, a worker id and a per-millisecond sequence (see
/// [`crate::idgen`]); callers must treat it as opaque besides the two
/// guarantees in spec §3: strict monotonicity within one issuer, and a
/// non-decreasing `timestamp_of`.
///
/// Serialized as a decimal string (not a JSON number) at every boundary, so
/// that a driver or language without 64-bit integers cannot silently
/// truncate it through a floating-point round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The top bit is always unset (see [`crate::idgen`]'s layout), so this
    /// always fits in a Postgres `BIGINT` column without truncation.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| CoreError::InvalidId(format!("EventId: {e}")))
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>()
            .map(EventId)
            .map_err(serde::de::Error::custom)
    }
}

/// Shard of the event log, in `[0, P)` for the deployment's configured `P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(u32);

impl PartitionId {
    /// Construct without bounds checking (e.g. when `p` is trusted/constant).
    pub fn new_unchecked(value: u32) -> Self {
        Self(value)
    }

    /// Construct, checking `value` is within `[0, total_partitions)`.
    pub fn checked(value: u32, total_partitions: u32) -> Result<Self, CoreError> {
        if value >= total_partitions {
            return Err(CoreError::InvalidPartition {
                partition: value,
                total: total_partitions,
            });
        }
        Ok(Self(value))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_newtype {
    ($t:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_newtype!(UserId, "Identifier of a user, acting as either actor or recipient.");
string_newtype!(PostId, "Identifier of a post, the object referenced by like/reply/mention events.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_roundtrips_through_decimal_string() {
        let id = EventId::from_raw(123_456_789);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"123456789\"");
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn event_id_fits_postgres_bigint() {
        let id = EventId::from_raw(u64::MAX >> 1);
        assert!(id.as_i64() >= 0);
    }

    #[test]
    fn partition_id_rejects_out_of_range() {
        assert!(PartitionId::checked(4, 4).is_err());
        assert!(PartitionId::checked(3, 4).is_ok());
    }
}
