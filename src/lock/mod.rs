//! Distributed Lock
//!
//! Mutual exclusion across instances on top of the shared store's
//! set-if-absent-with-expiry.
//!
//! # Protocol
//!
//! ```text
//! try_lock(resource, ttl):  SET lock:<resource> <token> NX EX ttl   → granted?
//! unlock():                 DEL lock:<resource> IF value == <token>  (atomic)
//! ```
//!
//! - `try_lock` is a single attempt; retry and backoff belong to the caller
//! - Tokens are `<instance uuid>-<sequence>`, unique per acquisition
//! - The TTL only bounds how long a crashed holder can block others;
//!   release always checks ownership
//! - A [`HeldLock`] dropped without `unlock` (a cancelled caller) releases
//!   itself on a spawned task

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Keyspace;
use crate::domain::ports::KvStore;
use crate::error::Result;

/// Owner token stored as the lock value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LockToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lock factory bound to one shared store.
///
/// Construct once per process and share it; every instance gets its own
/// identity, so two `DistributedLock`s never mint the same token.
pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    keyspace: Keyspace,
    instance_id: Uuid,
    sequence: AtomicU64,
}

impl DistributedLock {
    /// Create a lock factory with a fresh instance identity.
    pub fn new(store: Arc<dyn KvStore>, keyspace: Keyspace) -> Self {
        Self {
            store,
            keyspace,
            instance_id: Uuid::new_v4(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Identity embedded in every token minted by this factory.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Store key guarding `resource`.
    pub fn key_for(&self, resource: &str) -> String {
        self.keyspace.lock_key(resource)
    }

    fn next_token(&self) -> LockToken {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        LockToken(format!("{}-{}", self.instance_id, seq))
    }

    /// Single non-blocking acquisition attempt.
    ///
    /// `Ok(None)` means another holder is active; it is not an error.
    pub async fn try_lock(&self, resource: &str, ttl: Duration) -> Result<Option<HeldLock>> {
        let key = self.key_for(resource);
        let token = self.next_token();

        if self.store.set_nx(&key, token.as_str(), ttl).await? {
            debug!(lock = %key, token = %token, ttl_secs = ttl.as_secs(), "Lock acquired");
            Ok(Some(HeldLock {
                store: self.store.clone(),
                key,
                token,
                released: false,
            }))
        } else {
            debug!(lock = %key, "Lock busy");
            Ok(None)
        }
    }

    /// Release `resource` only if it is still held with `token`.
    ///
    /// Returns false when the lock expired or is now owned by someone else.
    pub async fn unlock(&self, resource: &str, token: &LockToken) -> Result<bool> {
        let key = self.key_for(resource);
        release(self.store.as_ref(), &key, token).await
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("keyspace", &self.keyspace)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

async fn release(store: &dyn KvStore, key: &str, token: &LockToken) -> Result<bool> {
    let released = store.delete_if_equals(key, token.as_str()).await?;
    if released {
        debug!(lock = %key, token = %token, "Lock released");
    } else {
        warn!(lock = %key, token = %token, "Lock no longer owned at release");
    }
    Ok(released)
}

/// A granted lock. Release it with [`HeldLock::unlock`].
///
/// Dropping it unreleased (for example when the owning future is cancelled)
/// spawns the same ownership-checked release on the current tokio runtime.
/// Outside a runtime the store expires it after the TTL.
#[must_use = "a held lock must be released with unlock()"]
pub struct HeldLock {
    store: Arc<dyn KvStore>,
    key: String,
    token: LockToken,
    released: bool,
}

impl HeldLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Ownership-checked release.
    pub async fn unlock(mut self) -> Result<bool> {
        let result = release(self.store.as_ref(), &self.key, &self.token).await;
        self.released = true;
        result
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(lock = %self.key, "Lock dropped outside a runtime, left to expire");
            return;
        };

        debug!(lock = %self.key, token = %self.token, "Lock dropped while held, releasing");
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        runtime.spawn(async move {
            if let Err(e) = release(store.as_ref(), &key, &token).await {
                warn!(lock = %key, error = %e, "Background lock release failed");
            }
        });
    }
}

impl std::fmt::Debug for HeldLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
