//! Item catalog abstraction.
//!
//! The catalog owns the tracked item list and each item's current price. The refresh
//! cycle reads the id set fresh every run and writes prices back one item at a time.

pub mod memory;
pub mod postgres;

use crate::aggregation::ItemId;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

pub use memory::InMemoryCatalog;
pub use postgres::PgCatalog;

/// Result of a single price write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceUpdate {
    /// Stored; carries the price that was overwritten.
    Updated { previous: Option<i64> },
    /// The catalog has no item with this id.
    NotFound,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// All item ids the catalog wants priced.
    async fn list_tracked_ids(&self) -> Result<HashSet<ItemId>>;

    /// Stored price for an item. `None` if the item is unknown or has never been priced.
    async fn get_price(&self, item_id: ItemId) -> Result<Option<i64>>;

    /// Overwrite an item's current price.
    async fn set_price(&self, item_id: ItemId, price: i64) -> Result<PriceUpdate>;
}
