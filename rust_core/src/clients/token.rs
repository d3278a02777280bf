//! OAuth client-credentials token cache.
//!
//! Keeps a single bearer token and renews it lazily once it is within
//! `RENEWAL_MARGIN` of expiry.
//!
//! Not safe for unsynchronized concurrent renewal. It relies on the refresh guard:
//! the cache lives inside the guard, so only the cycle holding it can reach `get_token`.

use super::AccessTokenSource;
use crate::config::{ClientCredentials, MarketApiConfig};
use crate::error::{RefreshError, RefreshResult};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// Renew this long before the issuer's expiry.
pub const RENEWAL_MARGIN_SECS: i64 = 30;
/// Floor applied to the issuer-reported TTL.
pub const MIN_TTL_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Build from an issuer response received at `now`, applying the TTL floor.
    pub fn issued_at(token: String, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            token,
            expires_at: now + Duration::seconds(expires_in_secs.max(MIN_TTL_SECS)),
        }
    }

    /// Usable while `expires_at - margin` is still after `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(RENEWAL_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

pub struct TokenCache {
    client: Client,
    token_url: String,
    cached: Option<CachedToken>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("expires_at", &self.cached.as_ref().map(|c| c.expires_at))
            .finish()
    }
}

impl TokenCache {
    pub fn new(config: &MarketApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client for token endpoint")?;

        Ok(Self::with_client(client, config.token_url.clone()))
    }

    pub fn with_client(client: Client, token_url: String) -> Self {
        Self {
            client,
            token_url,
            cached: None,
        }
    }

    /// Current token, exchanging credentials first if none is cached or it is about to expire.
    pub async fn get_token(&mut self, credentials: &ClientCredentials) -> RefreshResult<String> {
        let now = Utc::now();
        if let Some(cached) = &self.cached {
            if cached.is_fresh_at(now) {
                debug!("Reusing cached access token (expires {})", cached.expires_at);
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.exchange(credentials).await?;
        let token = fresh.token.clone();
        self.cached = Some(fresh);
        Ok(token)
    }

    /// Expiry of the cached token, if any.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.cached.as_ref().map(|c| c.expires_at)
    }

    async fn exchange(&self, credentials: &ClientCredentials) -> RefreshResult<CachedToken> {
        debug!("Requesting access token from {}", self.token_url);

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::CredentialExchange {
                status: status.as_u16(),
                reason: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }

        let body = response.text().await?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::CredentialExchange {
                status: status.as_u16(),
                reason: format!("unparsable token response: {}", e),
            })?;

        if parsed.access_token.is_empty() {
            return Err(RefreshError::CredentialExchange {
                status: status.as_u16(),
                reason: "empty access_token".to_string(),
            });
        }

        let cached = CachedToken::issued_at(parsed.access_token, parsed.expires_in, Utc::now());
        info!(
            "Obtained access token (ttl {}s, expires {})",
            parsed.expires_in, cached.expires_at
        );
        Ok(cached)
    }
}

#[async_trait]
impl AccessTokenSource for TokenCache {
    async fn access_token(&mut self, credentials: &ClientCredentials) -> RefreshResult<String> {
        self.get_token(credentials).await
    }
}
