//! Token bucket limiter
//!
//! Per key, a pool of `capacity` tokens refilled continuously at
//! `refill_rate` tokens/second. A request consumes its tokens if enough are
//! available; otherwise nothing is consumed and the stored state is left
//! untouched. The bucket starts full on first touch.
//!
//! Refill and debit happen as one compare-and-swap against the packed state:
//! unlike the leaky bucket, a denial writes nothing, so repeated `get`s of
//! the stored state between calls observe identical bytes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::limiter::{BucketState, unix_now, validate_bucket_params, validate_cost};
use crate::store::AtomicStore;

/// Token bucket rate limiter
#[derive(Clone)]
pub struct TokenBucketLimiter {
    store: Arc<dyn AtomicStore>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucketLimiter {
    /// Create a limiter with the given capacity and refill rate (tokens per
    /// second). Both must be positive and finite.
    pub fn new(store: Arc<dyn AtomicStore>, capacity: f64, refill_rate: f64) -> Result<Self> {
        validate_bucket_params(capacity, refill_rate, "refill_rate")?;
        Ok(Self {
            store,
            capacity,
            refill_rate,
        })
    }

    /// Acquire a single token
    pub async fn acquire(&self, key: &str) -> Result<bool> {
        self.acquire_n(key, 1).await
    }

    /// Acquire `tokens` tokens, all or nothing
    pub async fn acquire_n(&self, key: &str, tokens: u32) -> Result<bool> {
        validate_cost(tokens, "tokens")?;
        let requested = f64::from(tokens);

        loop {
            let raw = self.store.get(key).await?;
            let now = unix_now();
            let stored = match raw.as_deref() {
                None => BucketState {
                    tokens: self.capacity,
                    ts: now,
                },
                Some(text) => match BucketState::decode(text) {
                    Some(state) => state,
                    None => {
                        warn!(key, "unreadable bucket state, resetting to full");
                        BucketState {
                            tokens: self.capacity,
                            ts: now,
                        }
                    }
                },
            };

            let refill = now.saturating_sub(stored.ts) as f64 * self.refill_rate;
            let available = (stored.tokens + refill).min(self.capacity);

            if available < requested {
                debug!(key, requested, available, "token bucket denied");
                return Ok(false);
            }

            let updated = BucketState {
                tokens: available - requested,
                ts: now,
            };
            if self
                .store
                .compare_and_swap(key, raw.as_deref(), &updated.encode())
                .await?
            {
                debug!(key, requested, remaining = updated.tokens, "token bucket admitted");
                return Ok(true);
            }
            // lost the race to a concurrent caller; re-read and recompute
        }
    }
}
