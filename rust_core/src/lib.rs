//! Crafting Core - auction house price refresh pipeline.
//!
//! This module provides:
//! - OAuth client-credentials token cache with expiry-aware renewal
//! - Commodities market client
//! - Top-slice weighted price aggregation over commodity listings
//! - Item catalog abstraction (PostgreSQL and in-memory)
//! - Guarded refresh orchestration shared by timer and manual triggers

pub mod aggregation;
pub mod catalog;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod refresh;

pub use aggregation::{AuctionGroup, AuctionListing, ItemId, PriceResult};
pub use catalog::{Catalog, InMemoryCatalog, PgCatalog, PriceUpdate};
pub use clients::{AccessTokenSource, MarketDataClient, MarketDataSource, TokenCache};
pub use config::{ClientCredentials, MarketApiConfig};
pub use error::{RefreshError, RefreshResult};
pub use refresh::{CycleReport, CycleSummary, RefreshOrchestrator, RefreshOutcome};
