// Blockfrost API response types.
// Defines structs for deserializing asset, transaction and UTxO responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IndexerError, Result};
use crate::metadata::{AgentMetadata, MetadataIssue};

/// Unit name of ADA amounts.
pub const LOVELACE: &str = "lovelace";

/// Entry of a policy asset listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetListItem {
    pub asset: String,
    pub quantity: String,
}

impl AssetListItem {
    /// Burned registrations keep their listing with quantity "0".
    pub fn is_active(&self) -> bool {
        self.quantity != "0"
    }
}

/// Native asset details; one per registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset: String,
    pub policy_id: String,
    pub asset_name: Option<String>,
    pub fingerprint: String,
    pub quantity: String,
    pub initial_mint_tx_hash: String,
    #[serde(default)]
    pub mint_or_burn_count: u64,
    pub onchain_metadata: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Asset {
    pub fn is_active(&self) -> bool {
        self.quantity != "0"
    }

    /// Validated registration metadata minted with the asset.
    pub fn agent_metadata(&self) -> Result<AgentMetadata> {
        let value = self
            .onchain_metadata
            .as_ref()
            .ok_or(IndexerError::Metadata(MetadataIssue::Missing))?;
        AgentMetadata::from_value(value)
    }
}

/// Transaction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block: String,
    pub block_height: u64,
    /// Unix seconds.
    pub block_time: i64,
    #[serde(default)]
    pub fees: Option<String>,
    #[serde(default)]
    pub output_amount: Vec<Amount>,
}

impl Transaction {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.block_time, 0)
    }
}

/// Reference to a transaction touching an address or asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub tx_hash: String,
    #[serde(default)]
    pub tx_index: u64,
    pub block_height: u64,
    /// Unix seconds.
    pub block_time: i64,
}

impl TransactionRef {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.block_time, 0)
    }
}

/// Row of `/addresses/{address}/transactions`.
pub type AddressTransaction = TransactionRef;

/// Row of `/assets/{asset}/transactions`.
pub type AssetTransaction = TransactionRef;

/// Quantity of one unit (lovelace or policy+asset name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub unit: String,
    pub quantity: String,
}

/// Sum of lovelace in a list of amounts. Unparseable quantities count as zero.
pub fn lovelace(amounts: &[Amount]) -> u64 {
    amounts
        .iter()
        .filter(|a| a.unit == LOVELACE)
        .filter_map(|a| a.quantity.parse::<u64>().ok())
        .sum()
}

/// Inputs and outputs of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUtxos {
    pub hash: String,
    #[serde(default)]
    pub inputs: Vec<UtxoInput>,
    #[serde(default)]
    pub outputs: Vec<UtxoOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
    pub address: String,
    #[serde(default)]
    pub amount: Vec<Amount>,
    pub tx_hash: String,
    pub output_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutput {
    pub address: String,
    #[serde(default)]
    pub amount: Vec<Amount>,
    pub output_index: u32,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub inline_datum: Option<String>,
}

/// Error body returned by Blockfrost with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
    pub message: Option<String>,
}
