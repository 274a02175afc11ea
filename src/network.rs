// Network selection and request scope.
// A scope says which Blockfrost deployment and registry policy a request targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IndexerError, Result};

/// Cardano network the dashboard is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Preprod,
    Mainnet,
}

impl Network {
    /// Default Blockfrost API base for this network.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Preprod => "preprod",
            Network::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request scope: everything that changes what an endpoint path resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
    pub base_url: String,
    pub api_key: String,
    /// Minting policy of the agent registry tokens.
    pub policy_id: String,
    /// Escrow contract address that receives agent payments.
    pub contract_address: String,
}

impl NetworkConfig {
    /// Scope with the network's default base URL and no registry identifiers.
    pub fn new(network: Network, api_key: impl Into<String>) -> Self {
        Self {
            network,
            base_url: network.default_base_url().to_string(),
            api_key: api_key.into(),
            policy_id: String::new(),
            contract_address: String::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = policy_id.into();
        self
    }

    pub fn with_contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = address.into();
        self
    }

    /// Scope component of a cache key.
    ///
    /// The same endpoint path means different data on a different network,
    /// deployment or policy, so all three participate.
    pub fn discriminator(&self) -> String {
        format!("{}|{}|{}", self.network, self.base_url, self.policy_id)
    }

    /// Reject scopes that would predictably fail upstream.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(IndexerError::MissingApiKey {
                network: self.network.to_string(),
            });
        }
        if self.base_url.trim().is_empty() {
            return Err(IndexerError::InvalidConfig(format!(
                "empty base URL for {}",
                self.network
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(IndexerError::InvalidConfig(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        Ok(())
    }
}
