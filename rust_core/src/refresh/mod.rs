//! Guarded auction refresh cycle.
//!
//! One cycle: load tracked ids -> get token -> fetch commodities -> aggregate -> write
//! prices. Timer and manual triggers share `refresh()`, which takes the guard without
//! waiting, so at most one cycle runs at a time and a busy cycle is never queued behind.
//!
//! The token cache sits inside the guard. Holding the permit is what makes its
//! unsynchronized renewal safe.

pub mod guard;

use crate::aggregation::{self, ItemId};
use crate::catalog::{Catalog, PriceUpdate};
use crate::clients::{AccessTokenSource, MarketDataSource};
use crate::config::ClientCredentials;
use crate::error::{RefreshError, RefreshResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use guard::{RefreshGuard, RefreshPermit};

/// Counts from one executed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Ids the catalog asked for
    pub tracked_items: usize,
    /// Tracked ids with at least one listing in the snapshot
    pub matched_items: usize,
    /// Ids that produced a price
    pub priced_items: usize,
    /// Prices written to the catalog
    pub updated_items: usize,
    /// Priced ids the catalog no longer knows
    pub unmatched_items: Vec<ItemId>,
}

/// Latest executed cycle, exposed for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub summary: Option<CycleSummary>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Completed(CycleSummary),
    /// Another cycle holds the guard
    AlreadyRunning,
    /// Client id or secret not configured; nothing was attempted
    MissingCredentials,
    Failed(RefreshError),
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::AlreadyRunning => "already_running",
            Self::MissingCredentials => "missing_credentials",
            Self::Failed(_) => "failed",
        }
    }
}

pub struct RefreshOrchestrator {
    guard: RefreshGuard<Box<dyn AccessTokenSource>>,
    market: Arc<dyn MarketDataSource>,
    catalog: Arc<dyn Catalog>,
    credentials: Option<ClientCredentials>,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("running", &self.is_running())
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl RefreshOrchestrator {
    pub fn new(
        credentials: Option<ClientCredentials>,
        tokens: Box<dyn AccessTokenSource>,
        market: Arc<dyn MarketDataSource>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        if credentials.is_none() {
            warn!("Refresh orchestrator created without client credentials; cycles will be skipped");
        }
        Self {
            guard: RefreshGuard::new(tokens),
            market,
            catalog,
            credentials,
            last_cycle: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.read().clone()
    }

    /// Manual trigger. `true` only when a cycle ran and completed.
    ///
    /// A cycle that starts and then fails also returns `false`, the same as "already
    /// running" and "missing credentials". Callers that need to tell these apart use
    /// [`RefreshOrchestrator::refresh`], which the HTTP trigger does.
    pub async fn trigger_fetch(&self) -> bool {
        self.refresh().await.is_success()
    }

    /// Timer entry point. Outcomes are logged, never returned.
    pub async fn run_scheduled(&self) {
        match self.refresh().await {
            RefreshOutcome::Completed(summary) => info!(
                "Scheduled refresh completed: {} prices updated, {} unmatched",
                summary.updated_items,
                summary.unmatched_items.len()
            ),
            RefreshOutcome::AlreadyRunning => {
                info!("Scheduled refresh skipped: previous cycle still running")
            }
            RefreshOutcome::MissingCredentials => {
                warn!("Scheduled refresh skipped: missing client credentials")
            }
            RefreshOutcome::Failed(e) => error!("Scheduled refresh failed: {}", e),
        }
    }

    /// The guarded routine shared by both triggers.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(mut permit) = self.guard.try_acquire() else {
            info!("Fetch already in progress");
            return RefreshOutcome::AlreadyRunning;
        };

        let Some(credentials) = self.credentials.as_ref() else {
            warn!("Missing client id/secret - check BLIZZARD_CLIENT_ID and BLIZZARD_CLIENT_SECRET");
            return RefreshOutcome::MissingCredentials;
        };

        let started_at = Utc::now();
        info!("Starting auction refresh cycle");

        let result = self.run_cycle(&mut permit, credentials).await;

        let finished_at = Utc::now();
        let report = CycleReport {
            started_at,
            finished_at,
            succeeded: result.is_ok(),
            summary: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        *self.last_cycle.write() = Some(report);

        match result {
            Ok(summary) => {
                info!(
                    "Refresh cycle finished in {}ms: tracked={}, matched={}, priced={}, updated={}, unmatched={}",
                    (finished_at - started_at).num_milliseconds(),
                    summary.tracked_items,
                    summary.matched_items,
                    summary.priced_items,
                    summary.updated_items,
                    summary.unmatched_items.len()
                );
                RefreshOutcome::Completed(summary)
            }
            Err(e) => {
                error!(status = ?e.status(), "Refresh cycle failed: {}", e);
                RefreshOutcome::Failed(e)
            }
        }
        // permit dropped here: guard released
    }

    async fn run_cycle(
        &self,
        tokens: &mut Box<dyn AccessTokenSource>,
        credentials: &ClientCredentials,
    ) -> RefreshResult<CycleSummary> {
        // Rebuilt every cycle so catalog edits apply immediately.
        let tracked_ids = self
            .catalog
            .list_tracked_ids()
            .await
            .map_err(RefreshError::Catalog)?;
        info!("Tracking {} item ids", tracked_ids.len());

        let token = tokens.access_token(credentials).await?;
        let payload = self.market.fetch_commodities(&token).await?;

        let group = aggregation::filter_and_group(&payload, &tracked_ids);
        drop(payload);
        let prices = aggregation::aggregate(&group);

        let mut summary = CycleSummary {
            tracked_items: tracked_ids.len(),
            matched_items: group.len(),
            priced_items: prices.len(),
            ..Default::default()
        };

        for (item_id, price) in prices {
            let Ok(price) = i64::try_from(price) else {
                warn!("Price {} for item {} exceeds storable range, skipping", price, item_id);
                continue;
            };

            let update = self
                .catalog
                .set_price(item_id, price)
                .await
                .map_err(RefreshError::Catalog)?;

            match update {
                PriceUpdate::Updated { previous } => {
                    debug!("Item {} price {:?} -> {}", item_id, previous, price);
                    summary.updated_items += 1;
                }
                PriceUpdate::NotFound => {
                    warn!("{}", RefreshError::CatalogMismatch { item_id });
                    summary.unmatched_items.push(item_id);
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn credentials() -> Option<ClientCredentials> {
        ClientCredentials::from_parts(Some("client".into()), Some("secret".into()))
    }

    fn payload() -> String {
        json!({
            "auctions": [
                { "item": { "id": 1 }, "unit_price": 100, "quantity": 4 },
                { "item": { "id": 2 }, "unit_price": 250, "quantity": 1 },
                { "item": { "id": 2 }, "unit_price": 200, "quantity": 3 },
                { "item": { "id": 99 }, "unit_price": 5, "quantity": 10 }
            ]
        })
        .to_string()
    }

    struct FakeTokens {
        calls: Arc<AtomicUsize>,
        fail_with: Option<u16>,
    }

    impl FakeTokens {
        fn ok(calls: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                calls: calls.clone(),
                fail_with: None,
            })
        }
    }

    #[async_trait]
    impl AccessTokenSource for FakeTokens {
        async fn access_token(&mut self, _: &ClientCredentials) -> RefreshResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(status) => Err(RefreshError::CredentialExchange {
                    status,
                    reason: "denied".into(),
                }),
                None => Ok("token".into()),
            }
        }
    }

    /// Serves `payload`, or fails with `status` when it is not 200.
    struct FakeMarket {
        calls: AtomicUsize,
        status: AtomicU16,
        payload: String,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
        panic_on_fetch: bool,
    }

    impl FakeMarket {
        fn serving(payload: String) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: AtomicU16::new(200),
                payload,
                gate: None,
                panic_on_fetch: false,
            }
        }
    }

    #[async_trait]
    impl MarketDataSource for FakeMarket {
        async fn fetch_commodities(&self, token: &str) -> RefreshResult<String> {
            assert_eq!(token, "token");
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.panic_on_fetch {
                panic!("market exploded");
            }
            match self.status.load(Ordering::SeqCst) {
                200 => Ok(self.payload.clone()),
                status => Err(RefreshError::MarketFetch {
                    status,
                    reason: "upstream error".into(),
                }),
            }
        }
    }

    /// Lists ids the underlying catalog cannot store, as when items are deleted mid-cycle.
    struct DriftingCatalog {
        inner: InMemoryCatalog,
        phantom: Vec<ItemId>,
    }

    #[async_trait]
    impl Catalog for DriftingCatalog {
        async fn list_tracked_ids(&self) -> anyhow::Result<HashSet<ItemId>> {
            let mut ids = self.inner.list_tracked_ids().await?;
            ids.extend(self.phantom.iter().copied());
            Ok(ids)
        }

        async fn get_price(&self, item_id: ItemId) -> anyhow::Result<Option<i64>> {
            self.inner.get_price(item_id).await
        }

        async fn set_price(&self, item_id: ItemId, price: i64) -> anyhow::Result<PriceUpdate> {
            self.inner.set_price(item_id, price).await
        }
    }

    fn orchestrator(
        creds: Option<ClientCredentials>,
        token_calls: &Arc<AtomicUsize>,
        market: Arc<FakeMarket>,
        catalog: Arc<dyn Catalog>,
    ) -> RefreshOrchestrator {
        RefreshOrchestrator::new(creds, FakeTokens::ok(token_calls), market, catalog)
    }

    #[tokio::test]
    async fn test_cycle_updates_only_priced_items() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1, 2, 3]));
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(credentials(), &token_calls, market.clone(), catalog.clone());

        let summary = match orch.refresh().await {
            RefreshOutcome::Completed(summary) => summary,
            other => panic!("expected completion, got {:?}", other),
        };

        assert_eq!(summary.tracked_items, 3);
        assert_eq!(summary.matched_items, 2);
        assert_eq!(summary.priced_items, 2);
        assert_eq!(summary.updated_items, 2);
        assert!(summary.unmatched_items.is_empty());

        let snapshot = catalog.snapshot().await;
        assert_eq!(
            snapshot,
            HashMap::from([(1, Some(100)), (2, Some(200)), (3, None)])
        );
        assert!(!orch.is_running());
        assert_eq!(token_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_fetch_reports_success() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(credentials(), &token_calls, market, catalog);

        assert!(orch.trigger_fetch().await);
        let report = orch.last_cycle().unwrap();
        assert!(report.succeeded);
        assert_eq!(report.summary.unwrap().updated_items, 1);
    }

    #[tokio::test]
    async fn test_missing_credentials_skips_network() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(None, &token_calls, market.clone(), catalog.clone());

        let outcome = orch.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::MissingCredentials));
        assert!(!orch.trigger_fetch().await);

        assert_eq!(token_calls.load(Ordering::SeqCst), 0);
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);
        assert!(!orch.is_running());
        assert!(orch.last_cycle().is_none());
        assert_eq!(catalog.get_price(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_market_error_leaves_catalog_untouched() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1, 2]));
        catalog.insert(2, Some(777)).await;
        let market = Arc::new(FakeMarket::serving(payload()));
        market.status.store(500, Ordering::SeqCst);
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(credentials(), &token_calls, market.clone(), catalog.clone());

        let before = catalog.snapshot().await;
        let outcome = orch.refresh().await;
        match &outcome {
            RefreshOutcome::Failed(e) => assert_eq!(e.status(), Some(500)),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(catalog.snapshot().await, before);
        assert!(!orch.is_running());

        let report = orch.last_cycle().unwrap();
        assert!(!report.succeeded);
        assert!(report.error.unwrap().contains("500"));

        // A cycle that starts and fails is still `false` for the boolean trigger.
        assert!(!orch.trigger_fetch().await);
        assert_eq!(market.calls.load(Ordering::SeqCst), 2);

        // Guard was released: the next trigger runs a cycle.
        market.status.store(200, Ordering::SeqCst);
        assert!(orch.trigger_fetch().await);
        assert_eq!(market.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_token_failure_fails_cycle() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let tokens = Box::new(FakeTokens {
            calls: token_calls.clone(),
            fail_with: Some(401),
        });
        let orch = RefreshOrchestrator::new(credentials(), tokens, market.clone(), catalog.clone());

        let outcome = orch.refresh().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed(RefreshError::CredentialExchange { status: 401, .. })
        ));
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.get_price(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_returns_immediately() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let mut market = FakeMarket::serving(payload());
        market.gate = Some((entered.clone(), release.clone()));

        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = Arc::new(orchestrator(
            credentials(),
            &token_calls,
            Arc::new(market),
            catalog,
        ));

        let first = tokio::spawn({
            let orch = orch.clone();
            async move { orch.trigger_fetch().await }
        });

        entered.notified().await;
        assert!(orch.is_running());

        let second = tokio::time::timeout(Duration::from_millis(200), orch.refresh())
            .await
            .expect("second trigger must not wait for the running cycle");
        assert!(matches!(second, RefreshOutcome::AlreadyRunning));

        release.notify_one();
        assert!(first.await.unwrap());
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_unmatched_ids_do_not_abort_cycle() {
        let catalog = Arc::new(DriftingCatalog {
            inner: InMemoryCatalog::with_items([1]),
            phantom: vec![2],
        });
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(credentials(), &token_calls, market, catalog.clone());

        let RefreshOutcome::Completed(summary) = orch.refresh().await else {
            panic!("cycle should complete despite unmatched ids");
        };
        assert_eq!(summary.priced_items, 2);
        assert_eq!(summary.updated_items, 1);
        assert_eq!(summary.unmatched_items, vec![2]);
        assert_eq!(catalog.get_price(1).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_tracked_ids_reloaded_each_cycle() {
        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let market = Arc::new(FakeMarket::serving(payload()));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = orchestrator(credentials(), &token_calls, market, catalog.clone());

        assert!(orch.trigger_fetch().await);
        assert_eq!(catalog.get_price(2).await.unwrap(), None);

        catalog.insert(2, None).await;
        assert!(orch.trigger_fetch().await);
        assert_eq!(catalog.get_price(2).await.unwrap(), Some(200));
    }

    #[tokio::test]
    async fn test_panic_inside_cycle_releases_guard() {
        let mut market = FakeMarket::serving(payload());
        market.panic_on_fetch = true;
        let catalog = Arc::new(InMemoryCatalog::with_items([1]));
        let token_calls = Arc::new(AtomicUsize::new(0));
        let orch = Arc::new(orchestrator(
            credentials(),
            &token_calls,
            Arc::new(market),
            catalog,
        ));

        let result = tokio::spawn({
            let orch = orch.clone();
            async move { orch.run_scheduled().await }
        })
        .await;

        assert!(result.is_err());
        assert!(!orch.is_running());
    }
}
