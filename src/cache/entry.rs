// Cache keys and entries.
// Keys combine the request scope with the endpoint path; entries carry a fetch timestamp.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::network::NetworkConfig;

/// Default staleness window when a caller does not supply one: 5 minutes.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Composite cache key: scope discriminator plus endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    scope: String,
    endpoint: String,
}

impl CacheKey {
    pub fn new(scope: &NetworkConfig, endpoint: &str) -> Self {
        Self {
            scope: scope.discriminator(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.endpoint, self.scope)
    }
}

/// A cached upstream payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The payload as returned by the indexer.
    pub value: Arc<Value>,
    /// When the payload was retrieved.
    pub fetched_at: Instant,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(value: Arc<Value>) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    /// Time elapsed since the payload was fetched.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.fetched_at)
    }

    /// Fresh while younger than `stale_time`. A zero window is never fresh.
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        self.age() < stale_time
    }
}
