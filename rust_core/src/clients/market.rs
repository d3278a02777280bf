//! Commodities auction endpoint client.

use super::MarketDataSource;
use crate::config::MarketApiConfig;
use crate::error::{RefreshError, RefreshResult};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

/// Stateless client for the commodities endpoint.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    client: Client,
    commodities_url: String,
    namespace: String,
    locale: String,
}

impl MarketDataClient {
    pub fn new(config: &MarketApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client for market endpoint")?;

        Ok(Self {
            client,
            commodities_url: config.commodities_url.clone(),
            namespace: config.namespace.clone(),
            locale: config.locale.clone(),
        })
    }

    /// GET the commodities snapshot. Non-2xx and empty bodies are failures.
    pub async fn fetch_commodities(&self, access_token: &str) -> RefreshResult<String> {
        debug!("Fetching commodities from {}", self.commodities_url);

        let response = self
            .client
            .get(&self.commodities_url)
            .query(&[
                ("namespace", self.namespace.as_str()),
                ("locale", self.locale.as_str()),
            ])
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        info!("Commodities API response status: {}", status);

        if !status.is_success() {
            return Err(RefreshError::MarketFetch {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("non-success status")
                    .to_string(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(RefreshError::MarketFetch {
                status: status.as_u16(),
                reason: "empty body".to_string(),
            });
        }

        info!("Fetched commodities payload ({} bytes)", body.len());
        Ok(body)
    }
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    async fn fetch_commodities(&self, access_token: &str) -> RefreshResult<String> {
        MarketDataClient::fetch_commodities(self, access_token).await
    }
}
