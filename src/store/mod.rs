//! Atomic store abstraction
//!
//! This module provides:
//! - `AtomicStore`: capability trait over the remote store's atomic operations
//! - `StoreOp` / `StoreValue`: the pipeline operation and result model
//! - `RedisStore`: Redis-backed implementation
//! - `MemoryStore`: in-process implementation for tests and single-process use
//!
//! The trait exposes only operations that are atomic at the store level; it is
//! the sole synchronization mechanism available to the coordination
//! primitives. Implementations are injected as `Arc<dyn AtomicStore>` so a
//! primitive never binds to a particular backend.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// One operation in an atomic pipeline
#[derive(Clone, Debug)]
pub enum StoreOp {
    Get(String),
    Set(String, String),
    Delete(String),
    IncrBy(String, f64),
    /// Remove sorted-set members with score in `[min, max]`
    ZRemRangeByScore { key: String, min: f64, max: f64 },
    /// Add a member with the given score to a sorted set
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },
    /// Sorted-set cardinality
    ZCard(String),
    Expire { key: String, ttl: Duration },
}

/// One result from an atomic pipeline, in call order
#[derive(Clone, Debug, PartialEq)]
pub enum StoreValue {
    Nil,
    Int(i64),
    Float(f64),
    Text(String),
}

impl StoreValue {
    /// Integer view of the value, if it has one
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StoreValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Capability trait over the external store's atomic operations
///
/// Every method maps to a single operation that the store executes
/// indivisibly with respect to concurrent clients. Read-modify-write
/// sequences that must not interleave go through `compare_and_swap`,
/// `delete_if_equals`, or `pipeline`.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Set `key` to `value` with a TTL, only if the key does not exist.
    /// Returns whether the set happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Get the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally set `key` to `value` (no TTL)
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`; returns whether a key was actually removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically add `delta` to the number stored at `key` (missing key
    /// counts as 0) and return the new value
    async fn incr_by(&self, key: &str, delta: f64) -> Result<f64>;

    /// Atomically subtract `delta` from the number stored at `key` and
    /// return the new value
    async fn decr_by(&self, key: &str, delta: f64) -> Result<f64> {
        self.incr_by(key, -delta).await
    }

    /// Atomically set `key` to `new` iff its current value matches
    /// `expected` (`None` = key must be absent). Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool>;

    /// Atomically delete `key` iff its current value equals `expected`.
    /// Returns whether the key was removed.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Set a TTL on an existing key; returns false if the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Remove sorted-set members of `key` with score in `[min, max]`;
    /// returns the number removed
    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64>;

    /// Add `member` with `score` to the sorted set at `key`
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Cardinality of the sorted set at `key` (0 if absent)
    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Execute `ops` as a single atomic unit. No operation partially
    /// applies, other clients observe either none or all of the effects,
    /// and results come back in call order.
    async fn pipeline(&self, ops: &[StoreOp]) -> Result<Vec<StoreValue>>;
}
