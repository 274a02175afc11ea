// App session state.
// Owns the response cache and the active network, and exposes scoped reads to views.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::blockfrost::BlockfrostClient;
use crate::cache::{ResponseCache, Upstream};
use crate::config::Config;
use crate::error::Result;
use crate::network::{Network, NetworkConfig};

/// One dashboard session: configuration, the shared cache and the network
/// currently selected.
///
/// Views receive a reference (or a clone of [`App::cache`]) rather than
/// reaching for global state.
pub struct App<U = BlockfrostClient> {
    config: Config,
    cache: ResponseCache<U>,
    scope: NetworkConfig,
}

impl App<BlockfrostClient> {
    /// Build a session talking to Blockfrost with the configured retry policy.
    pub fn new(config: Config) -> Result<Self> {
        let client = BlockfrostClient::new(config.retry.policy())?;
        Self::with_upstream(config, client)
    }
}

impl<U: Upstream> App<U> {
    /// Build a session over any upstream. Fails if the selected network's
    /// scope is invalid.
    pub fn with_upstream(config: Config, upstream: U) -> Result<Self> {
        let scope = config.active_scope()?;
        let cache = ResponseCache::from_settings(upstream, &config.cache);
        info!(network = %scope.network, "session started");

        Ok(Self {
            config,
            cache,
            scope,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache<U> {
        &self.cache
    }

    /// Scope every read is currently keyed under.
    pub fn scope(&self) -> &NetworkConfig {
        &self.scope
    }

    pub fn network(&self) -> Network {
        self.scope.network
    }

    /// Select another network. Entries cached under the old scope stay in
    /// place and are found again when switching back.
    pub fn switch_network(&mut self, network: Network) -> Result<()> {
        if network == self.scope.network {
            return Ok(());
        }
        let scope = self.config.scope(network)?;
        info!(from = %self.scope.network, to = %network, "switching network");
        self.config.network = network;
        self.scope = scope;
        Ok(())
    }

    /// Cached read of `endpoint` under the active scope.
    pub async fn fetch_cached(
        &self,
        endpoint: &str,
        stale_time: Option<Duration>,
    ) -> Result<Arc<Value>> {
        self.cache.fetch_cached(&self.scope, endpoint, stale_time).await
    }

    /// User-triggered refresh: forget everything and re-fetch on next read.
    pub fn refresh(&self) {
        self.cache.clear();
    }
}
