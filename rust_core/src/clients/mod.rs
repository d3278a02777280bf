//! Market API clients.
//!
//! The orchestrator talks to the network only through these two traits so that a
//! refresh cycle can be driven against fakes in tests.

pub mod market;
pub mod token;

use crate::config::ClientCredentials;
use crate::error::RefreshResult;
use async_trait::async_trait;

// Re-export commonly used types
pub use market::MarketDataClient;
pub use token::{CachedToken, TokenCache};

/// Source of bearer tokens for the market API.
///
/// Takes `&mut self`: implementations may cache and renew without internal locking
/// because the caller holds the refresh guard for the whole cycle.
#[async_trait]
pub trait AccessTokenSource: Send {
    async fn access_token(&mut self, credentials: &ClientCredentials) -> RefreshResult<String>;
}

/// Source of raw commodities payloads.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_commodities(&self, access_token: &str) -> RefreshResult<String>;
}
