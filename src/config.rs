// Configuration loading.
// Layers defaults, a YAML file from the platform config dir and AGENT_INDEXER_* env vars.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::blockfrost::RetryPolicy;
use crate::cache::DEFAULT_STALE_TIME;
use crate::error::{IndexerError, Result};
use crate::network::{Network, NetworkConfig};

/// Prefix for environment overrides, e.g. `AGENT_INDEXER_PREPROD__API_KEY`.
pub const ENV_PREFIX: &str = "AGENT_INDEXER_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Get the base config directory (~/.config/agent-indexer on Linux).
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "agent-indexer").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path to the default config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.yaml"))
}

/// Per-network connection and registry identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Overrides the network's public Blockfrost URL.
    pub base_url: Option<String>,
    pub api_key: String,
    pub policy_id: String,
    pub contract_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Staleness window used when a caller does not pass one.
    pub stale_time_secs: u64,
    /// Maximum number of entries; unbounded when unset.
    pub max_entries: Option<usize>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_secs: DEFAULT_STALE_TIME.as_secs(),
            max_entries: None,
        }
    }
}

impl CacheSettings {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per request, including the first.
    pub attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.initial_delay_ms))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network selected at startup.
    pub network: Network,
    pub preprod: NetworkSettings,
    pub mainnet: NetworkSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub log: LogSettings,
}

impl Config {
    /// Load from the default config file (if any) and the environment.
    ///
    /// Precedence, lowest to highest: defaults, config file, environment.
    pub fn load() -> Result<Self> {
        Self::extract(Self::figment(config_path().as_deref()))
    }

    /// Load from an explicit config file, still honouring the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::extract(Self::figment(Some(path)))
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.attempts == 0 {
            return Err(IndexerError::InvalidConfig(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(IndexerError::InvalidConfig(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            return Err(IndexerError::InvalidConfig(format!(
                "invalid log level: {}",
                self.log.level
            )));
        }
        Ok(())
    }

    pub fn settings(&self, network: Network) -> &NetworkSettings {
        match network {
            Network::Preprod => &self.preprod,
            Network::Mainnet => &self.mainnet,
        }
    }

    /// Validated request scope for `network`.
    pub fn scope(&self, network: Network) -> Result<NetworkConfig> {
        let settings = self.settings(network);
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| network.default_base_url().to_string());

        let scope = NetworkConfig::new(network, settings.api_key.clone())
            .with_base_url(base_url)
            .with_policy_id(settings.policy_id.clone())
            .with_contract_address(settings.contract_address.clone());
        scope.validate()?;
        Ok(scope)
    }

    /// Scope for the network selected in this config.
    pub fn active_scope(&self) -> Result<NetworkConfig> {
        self.scope(self.network)
    }
}
