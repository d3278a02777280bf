//! Market API configuration and client credentials.
//!
//! Looks for:
//! - BLIZZARD_CLIENT_ID / BLIZZARD_CLIENT_SECRET: client-credentials pair (optional at load time)
//! - BLIZZARD_TOKEN_URL: OAuth token endpoint
//! - BLIZZARD_COMMODITIES_URL: commodities auction endpoint
//! - BLIZZARD_NAMESPACE / BLIZZARD_LOCALE: query parameters sent with every market request
//! - BLIZZARD_HTTP_TIMEOUT_SECS: transport timeout for both endpoints

use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth.battle.net/token";
pub const DEFAULT_COMMODITIES_URL: &str =
    "https://eu.api.blizzard.com/data/wow/auctions/commodities";
pub const DEFAULT_NAMESPACE: &str = "dynamic-eu";
pub const DEFAULT_LOCALE: &str = "en_GB";

/// Client id/secret pair used for the client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Returns `None` when either half is missing or blank.
    pub fn from_parts(client_id: Option<String>, client_secret: Option<String>) -> Option<Self> {
        let client_id = client_id.filter(|v| !v.trim().is_empty())?;
        let client_secret = client_secret.filter(|v| !v.trim().is_empty())?;
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct MarketApiConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub commodities_url: String,
    pub namespace: String,
    pub locale: String,
    pub request_timeout: Duration,
}

impl Default for MarketApiConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            commodities_url: DEFAULT_COMMODITIES_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl MarketApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: env::var("BLIZZARD_CLIENT_ID").ok(),
            client_secret: env::var("BLIZZARD_CLIENT_SECRET").ok(),
            token_url: env::var("BLIZZARD_TOKEN_URL").unwrap_or(defaults.token_url),
            commodities_url: env::var("BLIZZARD_COMMODITIES_URL")
                .unwrap_or(defaults.commodities_url),
            namespace: env::var("BLIZZARD_NAMESPACE").unwrap_or(defaults.namespace),
            locale: env::var("BLIZZARD_LOCALE").unwrap_or(defaults.locale),
            request_timeout: env::var("BLIZZARD_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Credentials, if both halves are configured.
    pub fn credentials(&self) -> Option<ClientCredentials> {
        ClientCredentials::from_parts(self.client_id.clone(), self.client_secret.clone())
    }
}
