//! Shared key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! RateLimiter ──incr/expire──┐
//!                            ├──▶ KvStore (memory.rs | redis.rs)
//! SessionManager ──get/set/del┘
//! ```
//!
//! # Design Decisions
//! - One narrow async trait; callers never see the concrete store
//! - Every value carries a TTL so abandoned keys self-expire
//! - Store errors are surfaced; callers decide whether to fall back

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::config::{StoreBackend, StoreConfig};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// TTL key-value operations used for sessions and rate-limit counters.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increment an integer counter, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the time-to-live of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete a key.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// Build the configured store.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-process key-value store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            tracing::info!(url = %config.redis_url, "Connected to Redis");
            Ok(Arc::new(store))
        }
    }
}
