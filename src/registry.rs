// Agent registry aggregations.
// Combines cached Blockfrost reads into the summaries the dashboard shows.

use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::blockfrost::{Asset, TransactionRef, lovelace};
use crate::cache::{ResponseCache, Upstream};
use crate::error::{IndexerError, Result};
use crate::network::NetworkConfig;

/// Registry totals plus details of the newest agents.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub total_agents: usize,
    /// Registrations whose token has not been burned.
    pub active_agents: usize,
    pub agents: Vec<Asset>,
}

/// A payment locked in the escrow contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub timestamp: DateTime<Utc>,
    pub tx_hash: String,
    /// Lovelace sent to the contract.
    pub amount: u64,
    /// First input address, or "Unknown".
    pub sender: String,
}

/// Display row for a registered agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub asset: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub registered_at: DateTime<Utc>,
    /// Whether the minted metadata passes validation.
    pub metadata_valid: bool,
}

/// Count for the current month and its change against the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlyCount {
    pub current: usize,
    pub previous: usize,
    /// Percent change; zero when the previous month was empty.
    pub change: f64,
}

impl MonthlyCount {
    fn tally(timestamps: impl IntoIterator<Item = DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let (year, month) = (now.year(), now.month());
        let (prev_year, prev_month) = if month == 1 {
            (year - 1, 12)
        } else {
            (year, month - 1)
        };

        let mut count = Self::default();
        for ts in timestamps {
            if ts.year() == year && ts.month() == month {
                count.current += 1;
            } else if ts.year() == prev_year && ts.month() == prev_month {
                count.previous += 1;
            }
        }
        if count.previous > 0 {
            count.change = (count.current as f64 - count.previous as f64)
                / count.previous as f64
                * 100.0;
        }
        count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_agents: usize,
    pub monthly_agents: MonthlyCount,
    pub total_transactions: usize,
    pub monthly_transactions: MonthlyCount,
}

fn block_time(seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| IndexerError::Malformed(format!("block time out of range: {seconds}")))
}

/// Count registrations and fetch details of the first `limit` (all when `None`).
///
/// Assets whose details cannot be fetched are left out of `agents`.
pub async fn registry_summary<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
    limit: Option<usize>,
) -> Result<RegistrySummary> {
    let assets = cache.all_policy_assets(scope).await?;
    let total_agents = assets.len();
    let active_agents = assets.iter().filter(|a| a.is_active()).count();
    debug!(total_agents, active_agents, "counted registry assets");

    let take = limit.unwrap_or(total_agents);
    let details = join_all(
        assets
            .iter()
            .take(take)
            .map(|item| cache.asset(scope, &item.asset)),
    )
    .await;

    let agents = details
        .into_iter()
        .zip(&assets)
        .filter_map(|(result, item)| match result {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!(asset = %item.asset, error = %e, "skipping asset details");
                None
            }
        })
        .collect();

    Ok(RegistrySummary {
        total_agents,
        active_agents,
        agents,
    })
}

/// Block time of the transaction that first minted `asset`.
pub async fn mint_time<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
    asset: &str,
) -> Result<DateTime<Utc>> {
    let details = cache.asset(scope, asset).await?;
    let tx = cache
        .transaction(scope, &details.initial_mint_tx_hash)
        .await?;
    block_time(tx.block_time)
}

async fn payment<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
    tx: &TransactionRef,
) -> Result<Option<Payment>> {
    let utxos = cache.transaction_utxos(scope, &tx.tx_hash).await?;

    let Some(output) = utxos
        .outputs
        .iter()
        .find(|out| out.address == scope.contract_address)
    else {
        return Ok(None);
    };

    let sender = utxos
        .inputs
        .first()
        .map(|input| input.address.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(Some(Payment {
        timestamp: block_time(tx.block_time)?,
        tx_hash: tx.tx_hash.clone(),
        amount: lovelace(&output.amount),
        sender,
    }))
}

/// Payments into the escrow contract, newest first.
///
/// Transactions that do not pay the contract, or whose UTxOs cannot be
/// fetched, are skipped.
pub async fn latest_payments<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
) -> Result<Vec<Payment>> {
    let transactions = cache.contract_transactions(scope).await?;

    let results = join_all(transactions.iter().map(|tx| payment(cache, scope, tx))).await;

    let mut payments: Vec<Payment> = results
        .into_iter()
        .zip(&transactions)
        .filter_map(|(result, tx)| match result {
            Ok(payment) => payment,
            Err(e) => {
                warn!(tx = %tx.tx_hash, error = %e, "skipping payment");
                None
            }
        })
        .collect();

    payments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(payments)
}

async fn agent_summary<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
    asset: &str,
) -> Result<AgentSummary> {
    let details = cache.asset(scope, asset).await?;
    let tx = cache
        .transaction(scope, &details.initial_mint_tx_hash)
        .await?;
    let metadata = details.onchain_metadata.as_ref();

    let text = |field: &str| {
        metadata
            .and_then(|m| m.get(field))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(parts) => Some(
                    parts
                        .iter()
                        .filter_map(|p| p.as_str())
                        .collect::<String>(),
                ),
                _ => None,
            })
    };
    let author = metadata
        .and_then(|m| m.get("author"))
        .and_then(|a| a.get("name").or(Some(a)))
        .and_then(|a| a.as_str())
        .unwrap_or("Unknown")
        .to_string();

    Ok(AgentSummary {
        asset: details.asset.clone(),
        name: text("name").unwrap_or_else(|| "Unknown".to_string()),
        description: text("description").unwrap_or_else(|| "No description".to_string()),
        author,
        registered_at: block_time(tx.block_time)?,
        metadata_valid: details.agent_metadata().is_ok(),
    })
}

/// Every registered agent with its registration time, newest first.
///
/// Agents whose details cannot be fetched are skipped.
pub async fn top_agents<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
) -> Result<Vec<AgentSummary>> {
    let assets = cache.all_policy_assets(scope).await?;

    let results = join_all(
        assets
            .iter()
            .map(|item| agent_summary(cache, scope, &item.asset)),
    )
    .await;

    let mut agents: Vec<AgentSummary> = results
        .into_iter()
        .zip(&assets)
        .filter_map(|(result, item)| match result {
            Ok(agent) => Some(agent),
            Err(e) => {
                warn!(asset = %item.asset, error = %e, "skipping agent");
                None
            }
        })
        .collect();

    agents.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
    Ok(agents)
}

/// Registration and contract activity for the month containing `now`.
pub async fn dashboard_stats<U: Upstream>(
    cache: &ResponseCache<U>,
    scope: &NetworkConfig,
    now: DateTime<Utc>,
) -> Result<DashboardStats> {
    let assets = cache.all_policy_assets(scope).await?;
    let mint_times = join_all(
        assets
            .iter()
            .map(|item| mint_time(cache, scope, &item.asset)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<_>>>()?;

    let transactions = cache.contract_transactions(scope).await?;
    let tx_times = transactions
        .iter()
        .map(|tx| block_time(tx.block_time))
        .collect::<Result<Vec<_>>>()?;

    Ok(DashboardStats {
        total_agents: assets.len(),
        monthly_agents: MonthlyCount::tally(mint_times, now),
        total_transactions: transactions.len(),
        monthly_transactions: MonthlyCount::tally(tx_times, now),
    })
}
