//! In-Memory Shared Store Adapter
//!
//! Implements the [`KvStore`] port on a `DashMap`, with per-key expiry,
//! sparse bitmaps and atomic counters. Every command runs under the shard
//! lock of its key, which gives the same per-key linearizability a Redis
//! server provides.
//!
//! Used by tests and the demo binary. `set_offline(true)` makes every command
//! fail with [`Error::StoreUnavailable`] to exercise degraded paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::domain::ports::{KeyTtl, KvStore};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    /// Offsets of set bits; sparse so a 2^32-bit filter costs only what is set
    Bits(HashSet<u64>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn string(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: Value::Str(value.to_string()),
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn bits() -> Self {
        Self {
            value: Value::Bits(HashSet::new()),
            expires_at: None,
        }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Shared store statistics
#[derive(Debug, Clone, Default)]
pub struct KvStoreStats {
    /// Live keys (including not yet purged expired keys)
    pub keys: u64,
    /// Read commands (GET, GETBIT, TTL)
    pub reads: u64,
    /// Write commands (SET, SETNX, SETBIT, INCR)
    pub writes: u64,
    /// Delete commands
    pub deletes: u64,
}

/// In-memory shared store
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    data: DashMap<String, Slot>,
    offline: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Expire a key immediately, as if its TTL had elapsed.
    pub fn expire_now(&self, key: &str) {
        if let Some(mut slot) = self.data.get_mut(key) {
            slot.expires_at = Some(Instant::now());
        }
    }

    /// Number of bits currently set under a bitmap key.
    pub fn bit_count(&self, key: &str) -> usize {
        match self.data.get(key).map(|s| s.value.clone()) {
            Some(Value::Bits(bits)) => bits.len(),
            _ => 0,
        }
    }

    /// Snapshot of command statistics
    pub fn stats(&self) -> KvStoreStats {
        KvStoreStats {
            keys: self.data.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    /// Drop `key` if its TTL has elapsed.
    fn purge_if_expired(&self, key: &str, now: Instant) {
        self.data.remove_if(key, |_, slot| slot.is_expired(now));
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        self.purge_if_expired(key, now);
        match self.data.get(key) {
            Some(slot) => match &slot.value {
                Value::Str(s) => Ok(Some(s.clone())),
                Value::Bits(_) => Err(Error::WrongType {
                    key: key.to_string(),
                    expected: "string",
                }),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.data.insert(key.to_string(), Slot::string(value, ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Slot::string(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::string(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        Ok(self
            .data
            .remove(key)
            .map(|(_, slot)| !slot.is_expired(now))
            .unwrap_or(false))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        self.check_online()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let removed = self.data.remove_if(key, |_, slot| {
            !slot.is_expired(now) && matches!(&slot.value, Value::Str(v) if v == expected)
        });
        Ok(removed.is_some())
    }

    async fn set_bit(&self, key: &str, offset: u64, value: bool) -> Result<bool> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut slot = self.data.entry(key.to_string()).or_insert_with(Slot::bits);
        if slot.is_expired(now) {
            *slot = Slot::bits();
        }
        match &mut slot.value {
            Value::Bits(bits) => {
                let previous = if value {
                    !bits.insert(offset)
                } else {
                    bits.remove(&offset)
                };
                Ok(previous)
            }
            Value::Str(_) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "bitmap",
            }),
        }
    }

    async fn get_bit(&self, key: &str, offset: u64) -> Result<bool> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        match self.data.get(key) {
            Some(slot) if slot.is_expired(now) => Ok(false),
            Some(slot) => match &slot.value {
                Value::Bits(bits) => Ok(bits.contains(&offset)),
                Value::Str(_) => Err(Error::WrongType {
                    key: key.to_string(),
                    expected: "bitmap",
                }),
            },
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        let mut slot = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Slot::string("0", None));
        if slot.is_expired(now) {
            *slot = Slot::string("0", None);
        }
        match &mut slot.value {
            Value::Str(current) => {
                let next = current
                    .parse::<i64>()
                    .ok()
                    .and_then(|n| n.checked_add(1))
                    .ok_or_else(|| Error::NotAnInteger {
                        key: key.to_string(),
                    })?;
                *current = next.to_string();
                Ok(next)
            }
            Value::Bits(_) => Err(Error::WrongType {
                key: key.to_string(),
                expected: "integer",
            }),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        self.check_online()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let now = Instant::now();
        Ok(match self.data.get(key) {
            None => KeyTtl::Missing,
            Some(slot) => match slot.expires_at {
                None => KeyTtl::Persistent,
                Some(at) if at <= now => KeyTtl::Missing,
                Some(at) => KeyTtl::Expires(at - now),
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
