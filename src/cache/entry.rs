//! Cached payload encoding.
//!
//! ```text
//! ""                                        tombstone (short physical TTL)
//! {"id":1,"name":...}                       plain record (physical TTL)
//! {"expire_at":"2024-..Z","data":{...}}     logical-expiry envelope (no TTL)
//! ```

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stored value marking "this ID is known not to exist".
pub const TOMBSTONE: &str = "";

/// Record wrapped with its logical expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalEnvelope<T> {
    pub expire_at: DateTime<Utc>,
    pub data: T,
}

impl<T> LogicalEnvelope<T> {
    pub fn new(data: T, expire_at: DateTime<Utc>) -> Self {
        Self { expire_at, data }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

/// A decoded cache value.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue<T> {
    Tombstone,
    Fresh(T),
    /// Logically expired; still servable while a refresh runs
    Stale(T),
}

/// Decode a raw payload. `envelope` selects the logical-expiry layout.
pub fn decode<T: DeserializeOwned>(
    raw: &str,
    envelope: bool,
    now: DateTime<Utc>,
) -> Result<CachedValue<T>> {
    if raw == TOMBSTONE {
        return Ok(CachedValue::Tombstone);
    }
    if envelope {
        let wrapped: LogicalEnvelope<T> = serde_json::from_str(raw)?;
        if wrapped.is_expired(now) {
            Ok(CachedValue::Stale(wrapped.data))
        } else {
            Ok(CachedValue::Fresh(wrapped.data))
        }
    } else {
        Ok(CachedValue::Fresh(serde_json::from_str(raw)?))
    }
}

pub fn encode_plain<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn encode_envelope<T: Serialize>(value: &T, expire_at: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string(&LogicalEnvelope {
        expire_at,
        data: value,
    })?)
}
