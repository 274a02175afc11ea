// Blockfrost endpoint functions.
// Typed, cached reads of the asset, transaction and address endpoints the dashboard uses.

use std::time::Duration;

use tracing::debug;

use crate::cache::{ResponseCache, Upstream};
use crate::error::{IndexerError, Result};
use crate::network::NetworkConfig;

use super::types::{
    AddressTransaction, Asset, AssetListItem, AssetTransaction, Transaction, TransactionUtxos,
};

/// Blockfrost maximum page size.
pub const PAGE_SIZE: usize = 100;

/// Asset details rarely change once minted.
pub const ASSET_STALE_TIME: Duration = Duration::from_secs(15 * 60);

/// Confirmed transactions are immutable; an hour keeps memory in check.
pub const TRANSACTION_STALE_TIME: Duration = Duration::from_secs(60 * 60);

fn require_policy(scope: &NetworkConfig) -> Result<&str> {
    if scope.policy_id.is_empty() {
        return Err(IndexerError::InvalidConfig(format!(
            "no registry policy ID configured for {}",
            scope.network
        )));
    }
    Ok(&scope.policy_id)
}

fn require_contract(scope: &NetworkConfig) -> Result<&str> {
    if scope.contract_address.is_empty() {
        return Err(IndexerError::InvalidConfig(format!(
            "no contract address configured for {}",
            scope.network
        )));
    }
    Ok(&scope.contract_address)
}

impl<U: Upstream> ResponseCache<U> {
    /// One page (1-based) of the registry policy's assets, newest first.
    pub async fn policy_assets_page(
        &self,
        scope: &NetworkConfig,
        page: u32,
    ) -> Result<Vec<AssetListItem>> {
        let policy = require_policy(scope)?;
        let endpoint = format!(
            "/assets/policy/{}?page={}&count={}&order=desc",
            policy, page, PAGE_SIZE
        );
        self.fetch_typed(scope, &endpoint, None).await
    }

    /// Every asset under the registry policy, paging until a short page.
    pub async fn all_policy_assets(&self, scope: &NetworkConfig) -> Result<Vec<AssetListItem>> {
        let mut assets = Vec::new();
        let mut page = 1;

        loop {
            let batch = self.policy_assets_page(scope, page).await?;
            let count = batch.len();
            debug!(page, count, "fetched policy assets page");
            assets.extend(batch);

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(assets)
    }

    /// Details of one native asset, including its on-chain metadata.
    pub async fn asset(&self, scope: &NetworkConfig, asset: &str) -> Result<Asset> {
        self.fetch_typed(scope, &format!("/assets/{}", asset), Some(ASSET_STALE_TIME))
            .await
    }

    /// Transactions that minted, burned or moved an asset.
    pub async fn asset_transactions(
        &self,
        scope: &NetworkConfig,
        asset: &str,
    ) -> Result<Vec<AssetTransaction>> {
        self.fetch_typed(scope, &format!("/assets/{}/transactions", asset), None)
            .await
    }

    pub async fn transaction(&self, scope: &NetworkConfig, hash: &str) -> Result<Transaction> {
        self.fetch_typed(scope, &format!("/txs/{}", hash), Some(TRANSACTION_STALE_TIME))
            .await
    }

    pub async fn transaction_utxos(
        &self,
        scope: &NetworkConfig,
        hash: &str,
    ) -> Result<TransactionUtxos> {
        self.fetch_typed(
            scope,
            &format!("/txs/{}/utxos", hash),
            Some(TRANSACTION_STALE_TIME),
        )
        .await
    }

    pub async fn address_transactions(
        &self,
        scope: &NetworkConfig,
        address: &str,
    ) -> Result<Vec<AddressTransaction>> {
        self.fetch_typed(scope, &format!("/addresses/{}/transactions", address), None)
            .await
    }

    /// Transactions touching the scope's escrow contract.
    pub async fn contract_transactions(
        &self,
        scope: &NetworkConfig,
    ) -> Result<Vec<AddressTransaction>> {
        let address = require_contract(scope)?;
        self.address_transactions(scope, address).await
    }
}
