//! Commodity auction aggregation.
//!
//! Turns a raw commodities payload into one representative price per tracked item:
//! 1. Parse the `auctions` array and keep only tracked, non-zero item ids
//! 2. Group listings per item in payload order
//! 3. Per item, take the cheapest 20% of listings (rounded up, at least one)
//! 4. Double the quantity of the cheapest half of that slice
//! 5. Quantity-weighted average, truncated to an integer
//!
//! The result approximates what a buyer would actually pay rather than a plain mean
//! that a thin tail of overpriced listings would drag upward.

use crate::error::{RefreshError, RefreshResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Item identifier as used by the market API and the catalog.
pub type ItemId = i64;

/// One commodity listing. Prices are in copper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionListing {
    pub item_id: ItemId,
    pub unit_price: u64,
    pub quantity: u64,
}

/// Tracked listings keyed by item id, each list in payload order.
pub type AuctionGroup = BTreeMap<ItemId, Vec<AuctionListing>>;

/// Representative price per item id.
pub type PriceResult = BTreeMap<ItemId, u64>;

/// Share of the cheapest listings that feed the price, as a ratio (1/5 = 20%).
const SELECTED_NUMERATOR: usize = 1;
const SELECTED_DENOMINATOR: usize = 5;

/// Parse every entry of the top-level `auctions` array.
///
/// Missing fields default to 0. A payload without an `auctions` array is an empty
/// snapshot, not an error; only a body that is not JSON at all fails.
pub fn parse_auctions(raw: &str) -> RefreshResult<Vec<AuctionListing>> {
    let root: Value = serde_json::from_str(raw)?;

    let Some(auctions) = root.get("auctions").and_then(Value::as_array) else {
        debug!("Payload has no auctions array");
        return Ok(Vec::new());
    };

    Ok(auctions
        .iter()
        .map(|entry| AuctionListing {
            item_id: entry
                .get("item")
                .and_then(|item| item.get("id"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
            unit_price: entry.get("unit_price").and_then(Value::as_u64).unwrap_or(0),
            quantity: entry.get("quantity").and_then(Value::as_u64).unwrap_or(0),
        })
        .collect())
}

/// Keep listings for tracked items only and group them by item id.
///
/// An unparsable body is logged and treated as an empty market.
pub fn filter_and_group(raw: &str, tracked_ids: &HashSet<ItemId>) -> AuctionGroup {
    let listings = match parse_auctions(raw) {
        Ok(listings) => listings,
        Err(e) => {
            warn!("Treating market payload as empty: {}", e);
            return AuctionGroup::new();
        }
    };

    group_listings(listings, tracked_ids)
}

/// Group already-parsed listings. Untracked ids and id 0 are dropped.
pub fn group_listings(
    listings: impl IntoIterator<Item = AuctionListing>,
    tracked_ids: &HashSet<ItemId>,
) -> AuctionGroup {
    let mut group = AuctionGroup::new();
    for listing in listings {
        if listing.item_id == 0 || !tracked_ids.contains(&listing.item_id) {
            continue;
        }
        group.entry(listing.item_id).or_default().push(listing);
    }
    group
}

/// Compute a price for every item that has at least one listing with quantity.
pub fn aggregate(group: &AuctionGroup) -> PriceResult {
    group
        .iter()
        .filter_map(|(item_id, listings)| {
            let mut listings = listings.clone();
            weighted_price(&mut listings).map(|price| (*item_id, price))
        })
        .collect()
}

/// Number of cheapest listings that contribute to the price: ceil(n * 20%), at least 1.
pub fn selected_count(total: usize) -> usize {
    let rounded_up = (total * SELECTED_NUMERATOR).div_ceil(SELECTED_DENOMINATOR);
    rounded_up.max(1)
}

/// Top-slice weighted price of one item's listings.
///
/// Sorts `listings` in place by unit price (stable). Returns `None` for an empty slice or
/// when every selected listing has zero quantity.
pub fn weighted_price(listings: &mut [AuctionListing]) -> Option<u64> {
    if listings.is_empty() {
        return None;
    }

    listings.sort_by_key(|l| l.unit_price);

    let selected = selected_count(listings.len()).min(listings.len());
    let doubled = selected / 2;

    let mut total_qty: u128 = 0;
    let mut weighted_sum: u128 = 0;
    for (i, listing) in listings[..selected].iter().enumerate() {
        let mut qty = listing.quantity as u128;
        if i < doubled {
            qty *= 2;
        }
        total_qty += qty;
        weighted_sum += listing.unit_price as u128 * qty;
    }

    if total_qty == 0 {
        return None;
    }

    // Bounded by the largest selected unit price, so it always fits back into u64.
    Some((weighted_sum / total_qty) as u64)
}
