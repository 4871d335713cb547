//! Admission-control limiters
//!
//! Three per-key rate-limiting algorithms over the same store abstraction:
//! - `LeakyBucketLimiter`: capacity drains back at a constant rate
//! - `SlidingWindowLimiter`: counts events in a trailing time window
//! - `TokenBucketLimiter`: tokens refill at a constant rate and are consumed
//!
//! The limiters are stateless request/response processors; all shared state
//! lives in the store so any number of processes can enforce one limit.

use serde::{Deserialize, Serialize};

use crate::error::{CoordError, Result};

pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

/// Per-key bucket state as stored, packed into one value so decide-and-debit
/// is a single compare-and-swap.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub(crate) struct BucketState {
    /// Remaining tokens, within `[0, capacity]`
    pub tokens: f64,
    /// Unix timestamp (whole seconds) of the last state update
    pub ts: u64,
}

impl BucketState {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Current unix time in whole seconds
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Reject non-positive or non-finite capacity/rate pairs before any store call
pub(crate) fn validate_bucket_params(capacity: f64, rate: f64, rate_name: &str) -> Result<()> {
    if !capacity.is_finite() || capacity <= 0.0 {
        return Err(CoordError::invalid(format!(
            "capacity must be positive, got {capacity}"
        )));
    }
    if !rate.is_finite() || rate <= 0.0 {
        return Err(CoordError::invalid(format!(
            "{rate_name} must be positive, got {rate}"
        )));
    }
    Ok(())
}

/// Reject a zero cost before any store call
pub(crate) fn validate_cost(cost: u32, cost_name: &str) -> Result<()> {
    if cost == 0 {
        return Err(CoordError::invalid(format!("{cost_name} must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_state_round_trip() {
        let state = BucketState {
            tokens: 2.5,
            ts: 1_700_000_000,
        };
        assert_eq!(BucketState::decode(&state.encode()), Some(state));
    }

    #[test]
    fn test_bucket_state_decode_garbage() {
        assert_eq!(BucketState::decode("not json"), None);
        assert_eq!(BucketState::decode("{\"tokens\":\"x\"}"), None);
    }

    #[test]
    fn test_validate_bucket_params() {
        assert!(validate_bucket_params(10.0, 2.0, "leak_rate").is_ok());
        assert!(validate_bucket_params(0.0, 2.0, "leak_rate").is_err());
        assert!(validate_bucket_params(10.0, -1.0, "leak_rate").is_err());
        assert!(validate_bucket_params(f64::NAN, 2.0, "leak_rate").is_err());
        assert!(validate_bucket_params(10.0, f64::INFINITY, "leak_rate").is_err());
    }

    #[test]
    fn test_validate_cost() {
        assert!(validate_cost(1, "cost").is_ok());
        assert!(validate_cost(0, "cost").is_err());
    }
}
