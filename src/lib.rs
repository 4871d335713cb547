//! Stanchion - coordination primitives over a shared atomic key-value store
//!
//! This crate provides:
//! - A distributed mutual-exclusion lock with TTL and owner-checked release
//! - Leaky bucket, sliding window, and token bucket admission control
//! - An `AtomicStore` capability trait with Redis and in-memory backends
//!
//! The primitives share no memory: any number of independent processes make
//! consistent admission and mutual-exclusion decisions by coordinating only
//! through the store's atomic operations. Construct a store backend once and
//! inject it into each primitive:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use stanchion::{DistributedLock, StoreConfig, TokenBucketLimiter};
//! use stanchion::store::RedisStore;
//!
//! #[tokio::main]
//! async fn main() -> stanchion::Result<()> {
//!     let store = Arc::new(RedisStore::connect(StoreConfig::default()).await?);
//!
//!     let lock = DistributedLock::new(store.clone());
//!     if lock.acquire("nightly-job", Duration::from_secs(10)).await? {
//!         // critical section
//!         lock.release("nightly-job").await?;
//!     }
//!
//!     let limiter = TokenBucketLimiter::new(store, 5.0, 1.0)?;
//!     let admitted = limiter.acquire("user123").await?;
//!     println!("admitted: {admitted}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod limiter;
pub mod lock;
pub mod store;

pub use config::StoreConfig;
pub use error::{CoordError, Result};
pub use limiter::{LeakyBucketLimiter, SlidingWindowLimiter, TokenBucketLimiter};
pub use lock::DistributedLock;
pub use store::{AtomicStore, MemoryStore, RedisStore};
