//! Sliding window limiter
//!
//! Per key, a timestamped event log pruned to the trailing window. A request
//! is admitted iff the log holds at most `limit` events after recording it.
//! Every attempt is recorded, admitted or not: the algorithm counts attempts,
//! not admissions, so a flood of denied requests keeps the window closed.
//!
//! Prune, record, count, and TTL refresh execute as one atomic pipeline, so
//! concurrent callers never observe a half-pruned or half-counted log. The
//! TTL equals the window, letting idle keys clean themselves up.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::{CoordError, Result};
use crate::limiter::unix_now;
use crate::store::{AtomicStore, StoreOp};

/// Sliding window rate limiter
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn AtomicStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self { store }
    }

    /// Admit a request iff at most `limit` attempts were made on `key`
    /// within the trailing `window`. Timestamps carry whole-second
    /// granularity, so the window must be at least one second.
    pub async fn rate_limit(&self, key: &str, limit: u32, window: Duration) -> Result<bool> {
        if limit == 0 {
            return Err(CoordError::invalid("limit must be positive"));
        }
        let window_secs = window.as_secs();
        if window_secs == 0 {
            return Err(CoordError::invalid("window must be at least one second"));
        }

        let now = unix_now();
        // unique member per event so same-second attempts stay distinct
        let member = format!("{now}-{}", Uuid::new_v4());

        let results = self
            .store
            .pipeline(&[
                StoreOp::ZRemRangeByScore {
                    key: key.to_string(),
                    min: f64::NEG_INFINITY,
                    max: (now.saturating_sub(window_secs)) as f64,
                },
                StoreOp::ZAdd {
                    key: key.to_string(),
                    score: now as f64,
                    member,
                },
                StoreOp::ZCard(key.to_string()),
                StoreOp::Expire {
                    key: key.to_string(),
                    ttl: window,
                },
            ])
            .await?;

        let count = results
            .get(2)
            .and_then(|value| value.as_int())
            .unwrap_or(i64::MAX);
        let admitted = count <= i64::from(limit);

        debug!(key, limit, window_secs, count, admitted, "sliding window decision");

        Ok(admitted)
    }
}
