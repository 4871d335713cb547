//! Leaky bucket limiter
//!
//! Per key, a bucket of `capacity` tokens that refills ("leaks back") at
//! `leak_rate` tokens/second. A request costing `cost` tokens is admitted only
//! while enough capacity has drained. The bucket starts full on first touch.
//!
//! The stored level is written back on every call, admitted or not, so the
//! leak step is always persisted; the timestamp advances together with it so
//! elapsed drain is credited exactly once. Decide-and-debit runs as a
//! compare-and-swap loop against the packed state, making it linearizable per
//! key: two concurrent callers can never both debit the same level.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::limiter::{BucketState, unix_now, validate_bucket_params, validate_cost};
use crate::store::AtomicStore;

/// Leaky bucket rate limiter
#[derive(Clone)]
pub struct LeakyBucketLimiter {
    store: Arc<dyn AtomicStore>,
    capacity: f64,
    leak_rate: f64,
}

impl LeakyBucketLimiter {
    /// Create a limiter with the given bucket capacity and leak rate
    /// (tokens per second). Both must be positive and finite.
    pub fn new(store: Arc<dyn AtomicStore>, capacity: f64, leak_rate: f64) -> Result<Self> {
        validate_bucket_params(capacity, leak_rate, "leak_rate")?;
        Ok(Self {
            store,
            capacity,
            leak_rate,
        })
    }

    /// Admit a request costing one token
    pub async fn allow(&self, key: &str) -> Result<bool> {
        self.allow_n(key, 1).await
    }

    /// Admit a request costing `cost` tokens
    pub async fn allow_n(&self, key: &str, cost: u32) -> Result<bool> {
        validate_cost(cost, "cost")?;
        let cost = f64::from(cost);

        loop {
            let raw = self.store.get(key).await?;
            let now = unix_now();
            let stored = parse_state(key, raw.as_deref(), self.capacity, now);

            let elapsed = now.saturating_sub(stored.ts) as f64;
            let level = (stored.tokens + elapsed * self.leak_rate).min(self.capacity);

            let admitted = level >= cost;
            let updated = BucketState {
                tokens: if admitted { level - cost } else { level },
                ts: now,
            };

            if self
                .store
                .compare_and_swap(key, raw.as_deref(), &updated.encode())
                .await?
            {
                debug!(key, cost, level, admitted, "leaky bucket decision");
                return Ok(admitted);
            }
            // lost the race to a concurrent caller; re-read and recompute
        }
    }
}

/// Absent keys start as a full bucket; unreadable state is reset the same way
fn parse_state(key: &str, raw: Option<&str>, capacity: f64, now: u64) -> BucketState {
    match raw {
        None => BucketState {
            tokens: capacity,
            ts: now,
        },
        Some(text) => BucketState::decode(text).unwrap_or_else(|| {
            warn!(key, "unreadable bucket state, resetting to full");
            BucketState {
                tokens: capacity,
                ts: now,
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn limiter(capacity: f64, leak_rate: f64) -> LeakyBucketLimiter {
        LeakyBucketLimiter::new(Arc::new(MemoryStore::new()), capacity, leak_rate).unwrap()
    }

    #[tokio::test]
    async fn test_bucket_starts_full() {
        let limiter = limiter(5.0, 1.0);

        for _ in 0..5 {
            assert!(limiter.allow("user").await.unwrap());
        }
        assert!(!limiter.allow("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_multi_token_cost() {
        let limiter = limiter(10.0, 2.0);

        assert!(limiter.allow_n("user", 8).await.unwrap());
        // 2 tokens left, an 8-token request must be denied
        assert!(!limiter.allow_n("user", 8).await.unwrap());
        assert!(limiter.allow_n("user", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_level_never_negative_after_denial() {
        let limiter = limiter(3.0, 1.0);
        let store = limiter.store.clone();

        assert!(limiter.allow_n("user", 3).await.unwrap());
        assert!(!limiter.allow_n("user", 2).await.unwrap());

        let state = BucketState::decode(&store.get("user").await.unwrap().unwrap()).unwrap();
        assert!(state.tokens >= 0.0);
    }

    #[tokio::test]
    async fn test_leak_restores_capacity() {
        let limiter = limiter(2.0, 2.0);

        assert!(limiter.allow_n("user", 2).await.unwrap());
        assert!(!limiter.allow("user").await.unwrap());

        // 1 second at 2 tokens/second restores the bucket
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow_n("user", 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1.0, 1.0);

        assert!(limiter.allow("a").await.unwrap());
        assert!(!limiter.allow("a").await.unwrap());
        assert!(limiter.allow("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_cost_above_capacity_is_denied() {
        let limiter = limiter(5.0, 1.0);
        assert!(!limiter.allow_n("user", 6).await.unwrap());
        // the probe itself consumed nothing
        assert!(limiter.allow_n("user", 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let store: Arc<dyn AtomicStore> = Arc::new(MemoryStore::new());
        assert!(LeakyBucketLimiter::new(store.clone(), 0.0, 1.0).is_err());
        assert!(LeakyBucketLimiter::new(store.clone(), 5.0, 0.0).is_err());

        let limiter = LeakyBucketLimiter::new(store, 5.0, 1.0).unwrap();
        assert!(limiter.allow_n("user", 0).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_state_resets_to_full() {
        let store = Arc::new(MemoryStore::new());
        store.set("user", "garbage").await.unwrap();

        let limiter = LeakyBucketLimiter::new(store, 2.0, 1.0).unwrap();
        assert!(limiter.allow_n("user", 2).await.unwrap());
        assert!(!limiter.allow("user").await.unwrap());
    }
}
