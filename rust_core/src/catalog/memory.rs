//! Process-local catalog, used by tests and local runs without a database.

use super::{Catalog, PriceUpdate};
use crate::aggregation::ItemId;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    /// item_id -> current price
    items: RwLock<HashMap<ItemId, Option<i64>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with unpriced items.
    pub fn with_items(ids: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            items: RwLock::new(ids.into_iter().map(|id| (id, None)).collect()),
        }
    }

    pub async fn insert(&self, item_id: ItemId, price: Option<i64>) {
        self.items.write().await.insert(item_id, price);
    }

    pub async fn remove(&self, item_id: ItemId) {
        self.items.write().await.remove(&item_id);
    }

    /// Copy of every item and its price.
    pub async fn snapshot(&self) -> HashMap<ItemId, Option<i64>> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn list_tracked_ids(&self) -> Result<HashSet<ItemId>> {
        Ok(self.items.read().await.keys().copied().collect())
    }

    async fn get_price(&self, item_id: ItemId) -> Result<Option<i64>> {
        Ok(self.items.read().await.get(&item_id).copied().flatten())
    }

    async fn set_price(&self, item_id: ItemId, price: i64) -> Result<PriceUpdate> {
        let mut items = self.items.write().await;
        match items.get_mut(&item_id) {
            Some(current) => {
                let previous = current.replace(price);
                Ok(PriceUpdate::Updated { previous })
            }
            None => Ok(PriceUpdate::NotFound),
        }
    }
}
