//! PostgreSQL-backed catalog.
//!
//! Expects the `items` table maintained by the catalog admin layer:
//! `id BIGINT PRIMARY KEY, current_price BIGINT NULL, current_price_recorded_at TIMESTAMPTZ NULL`.

use super::{Catalog, PriceUpdate};
use crate::aggregation::ItemId;
use crate::db::{with_retry, RetryPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgCatalog {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn update_price(&self, item_id: ItemId, price: i64) -> Result<Option<Option<i64>>> {
        // The FROM subquery reads the pre-update row, so RETURNING sees the old price.
        let row = sqlx::query_as::<_, (Option<i64>,)>(
            r#"
            UPDATE items
            SET current_price = $2,
                current_price_recorded_at = NOW()
            FROM (SELECT id, current_price AS previous FROM items WHERE id = $1) prev
            WHERE items.id = prev.id
            RETURNING prev.previous
            "#,
        )
        .bind(item_id)
        .bind(price)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to update price for item {}", item_id))?;

        Ok(row.map(|(previous,)| previous))
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn list_tracked_ids(&self) -> Result<HashSet<ItemId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM items")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load tracked item ids")?;

        debug!("Loaded {} tracked item ids", ids.len());
        Ok(ids.into_iter().collect())
    }

    async fn get_price(&self, item_id: ItemId) -> Result<Option<i64>> {
        let price = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT current_price FROM items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read price for item {}", item_id))?;

        Ok(price.flatten())
    }

    async fn set_price(&self, item_id: ItemId, price: i64) -> Result<PriceUpdate> {
        let updated = with_retry(&self.retry, "catalog price update", || {
            self.update_price(item_id, price)
        })
        .await?;

        Ok(match updated {
            Some(previous) => PriceUpdate::Updated { previous },
            None => PriceUpdate::NotFound,
        })
    }
}
