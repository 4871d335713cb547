//! Distributed mutual-exclusion lock
//!
//! A non-blocking, best-effort lock built on the store's single atomic
//! "set if absent, with expiry" operation. Holding the lock means the key
//! exists; the TTL bounds how long a crashed holder can wedge it. There is no
//! wait queue and no fairness across contenders.
//!
//! Each successful acquisition stores a random fencing token as the lock
//! value, and release is an atomic compare-and-delete on that token, so only
//! the acquirer can release and a holder whose TTL already lapsed cannot
//! delete a lock someone else re-acquired.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoordError, Result};
use crate::store::AtomicStore;

/// Distributed lock service
///
/// Tracks its own acquisitions (name -> fencing token) so `release` can
/// prove ownership to the store. Clones share the tracking map.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn AtomicStore>,
    held: Arc<DashMap<String, String>>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self {
            store,
            held: Arc::new(DashMap::new()),
        }
    }

    /// Try to acquire the lock named `name` for at most `ttl`.
    ///
    /// Returns true iff this caller now holds the lock. Never blocks or
    /// retries; a held lock means an immediate false. A store failure
    /// propagates as an error, never as an acquisition result.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            return Err(CoordError::invalid("ttl must be positive"));
        }

        let token = Uuid::new_v4().to_string();
        let acquired = self.store.set_if_absent(name, &token, ttl).await?;
        if acquired {
            self.held.insert(name.to_string(), token);
            debug!(name, ttl_secs = ttl.as_secs(), "lock acquired");
        }
        Ok(acquired)
    }

    /// Release a lock previously acquired through this service.
    ///
    /// Returns whether the store actually removed the key: false when this
    /// caller never acquired `name`, and false when the acquisition's TTL
    /// already expired (the key is gone, or another holder owns it now).
    pub async fn release(&self, name: &str) -> Result<bool> {
        let Some((_, token)) = self.held.remove(name) else {
            return Ok(false);
        };

        let released = self.store.delete_if_equals(name, &token).await?;
        debug!(name, released, "lock release");
        Ok(released)
    }

    /// Whether `name` is currently held by anyone
    pub async fn is_locked(&self, name: &str) -> Result<bool> {
        Ok(self.store.get(name).await?.is_some())
    }
}
