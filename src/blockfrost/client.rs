// Blockfrost API HTTP client.
// Handles the project_id header, status classification and retried GETs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT},
};
use serde_json::Value;
use tracing::debug;

use crate::cache::Upstream;
use crate::error::{IndexerError, Result};
use crate::network::NetworkConfig;

use super::retry::RetryPolicy;
use super::types::ErrorBody;

/// Header carrying the Blockfrost project key.
pub const PROJECT_ID_HEADER: &str = "project_id";

/// Blockfrost client. Stateless with respect to network: every request
/// takes the scope it targets.
#[derive(Debug, Clone)]
pub struct BlockfrostClient {
    client: Client,
    retry: RetryPolicy,
}

impl BlockfrostClient {
    /// Create a client that retries with `retry`.
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("agent-indexer"));

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self { client, retry })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Single GET of `{base_url}{endpoint}`, no retries.
    pub async fn get(&self, scope: &NetworkConfig, endpoint: &str) -> Result<Value> {
        scope.validate()?;

        let url = format!("{}{}", scope.base_url.trim_end_matches('/'), endpoint);
        let api_key = HeaderValue::from_str(&scope.api_key)
            .map_err(|e| IndexerError::InvalidConfig(format!("invalid API key: {e}")))?;

        debug!(network = %scope.network, endpoint, "GET");
        let response = self
            .client
            .get(&url)
            .header(PROJECT_ID_HEADER, api_key)
            .send()
            .await?;

        let response = check_response(response).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET with bounded retry and linear backoff.
    ///
    /// Makes at most `retries` attempts, sleeping `initial_delay * attempt`
    /// after each transient failure.
    pub async fn fetch_from_indexer(
        &self,
        scope: &NetworkConfig,
        endpoint: &str,
        retries: u32,
        initial_delay: Duration,
    ) -> Result<Value> {
        // Configuration problems are not worth retrying.
        scope.validate()?;

        RetryPolicy::new(retries, initial_delay)
            .execute(|_| self.get(scope, endpoint))
            .await
    }

    /// GET using the client's configured retry policy.
    pub async fn fetch_with_retry(&self, scope: &NetworkConfig, endpoint: &str) -> Result<Value> {
        self.fetch_from_indexer(
            scope,
            endpoint,
            self.retry.attempts(),
            self.retry.delay_for(1),
        )
        .await
    }
}

#[async_trait]
impl Upstream for BlockfrostClient {
    async fn fetch(&self, scope: &NetworkConfig, endpoint: &str) -> Result<Value> {
        self.fetch_with_retry(scope, endpoint).await
    }
}

/// Check response status and convert errors.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        });

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(IndexerError::RateLimited { message }),
        status => Err(IndexerError::Status {
            status: status.as_u16(),
            message,
        }),
    }
}
