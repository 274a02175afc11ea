// Cache module for in-memory Blockfrost response caching.
// Memoizes and coalesces indexer reads per (scope, endpoint) pair.

pub mod entry;
pub mod store;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::network::NetworkConfig;

pub use entry::{CacheEntry, CacheKey, DEFAULT_STALE_TIME};
pub use store::ResponseCache;

/// Source of truth behind the cache.
///
/// Implemented by the Blockfrost HTTP client; tests substitute fakes.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// Fetch the JSON payload for `endpoint` under `scope`.
    async fn fetch(&self, scope: &NetworkConfig, endpoint: &str) -> Result<Value>;
}
