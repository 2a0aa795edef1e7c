//! Whole-second serde representation for `std::time::Duration`.
//!
//! Applied via `#[serde(with = "serde_secs")]` to config fields whose
//! contract values are quoted in seconds (cache TTL, quota spacing).
//! Sub-second precision is dropped on serialize.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
