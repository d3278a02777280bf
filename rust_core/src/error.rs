//! Error taxonomy for the refresh pipeline.
//!
//! Every variant is caught at the orchestrator boundary and turned into a
//! failed cycle; none of them is allowed to reach the scheduler.

use crate::aggregation::ItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    /// Client id or secret missing. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Token endpoint answered with a non-success status or an unusable body.
    #[error("credential exchange failed (status {status}): {reason}")]
    CredentialExchange { status: u16, reason: String },

    /// Commodities endpoint answered with a non-success status or an empty body.
    #[error("market fetch failed (status {status}): {reason}")]
    MarketFetch { status: u16, reason: String },

    /// Market body was not valid JSON. Downgraded to an empty snapshot by the aggregator.
    #[error("malformed market payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// A price was computed for an item the catalog does not know. Logged, cycle continues.
    #[error("item {item_id} not found in catalog")]
    CatalogMismatch { item_id: ItemId },

    #[error("catalog error: {0:#}")]
    Catalog(#[source] anyhow::Error),

    /// Transport failure before any HTTP status was observed.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type RefreshResult<T> = Result<T, RefreshError>;

impl RefreshError {
    /// Upstream HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CredentialExchange { status, .. } | Self::MarketFetch { status, .. } => {
                Some(*status)
            }
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
