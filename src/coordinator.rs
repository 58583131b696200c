//! The cache coherence core: decides what to serve from cache, what to
//! refetch, and merges partial provider results back into the snapshot.

use crate::error::{RateError, Result};
use crate::model::{CachedRate, RateSnapshot};
use crate::rate_provider::RateFetcher;
use crate::staleness;
use crate::store::RateStore;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What a single refresh pass decided for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshAction {
    /// Fresh and complete, no network call and no write.
    ServeAsIs,
    /// Entry is stale: refetch the union of its known currencies and the
    /// requested set, then replace the rate map wholesale.
    FullRefresh(Vec<String>),
    /// Entry is fresh but lacks some requested currencies: fetch only those
    /// and union-merge them in.
    PartialFetch(Vec<String>),
    /// No entry yet: fetch exactly the requested set and insert.
    Create(Vec<String>),
}

fn plan(
    entry: Option<&CachedRate>,
    requested_currencies: &[String],
    ttl: Duration,
    now: DateTime<Utc>,
) -> RefreshAction {
    let usability = staleness::evaluate(entry, requested_currencies, ttl, now);

    let Some(entry) = entry else {
        return RefreshAction::Create(requested_currencies.to_vec());
    };

    if usability.serve_as_is() {
        return RefreshAction::ServeAsIs;
    }

    if !usability.fresh {
        // Refreshing must never narrow an asset's currency coverage, so a
        // stale entry refetches everything it already knew plus the request.
        let mut union: Vec<String> = entry.currency_rate_map.keys().cloned().collect();
        union.sort();
        for currency in requested_currencies {
            if !union.contains(currency) {
                union.push(currency.clone());
            }
        }
        return RefreshAction::FullRefresh(union);
    }

    RefreshAction::PartialFetch(usability.missing_currencies.into_iter().collect())
}

/// Resolved and unresolved assets from one batch refresh.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// Post-merge entries, in request order. Unresolved assets are omitted.
    pub rates: Vec<CachedRate>,
    /// Assets whose provider call failed, with the failure that was absorbed.
    pub unresolved: Vec<(String, RateError)>,
}

/// Owns the snapshot store and serializes every load→mutate→persist cycle
/// behind one lock. Provider calls for distinct assets run concurrently
/// inside a batch; the merge and the single persist happen after all of them
/// complete.
pub struct RateCacheCoordinator {
    store: RateStore,
    fetcher: Arc<dyn RateFetcher>,
    ttl: Duration,
    lock: Mutex<()>,
}

impl RateCacheCoordinator {
    pub fn new(store: RateStore, fetcher: Arc<dyn RateFetcher>, ttl: Duration) -> Self {
        Self {
            store,
            fetcher,
            ttl,
            lock: Mutex::new(()),
        }
    }

    /// Every asset id currently present in the snapshot.
    pub async fn cached_asset_ids(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.store.load()?.asset_ids())
    }

    /// Runs the batch refresh algorithm for the requested assets and
    /// currencies and returns the resulting entries.
    ///
    /// Per-asset `AssetNotFound` and `ProviderUnavailable` failures are
    /// absorbed into `RefreshOutcome::unresolved`; `RateLimitExceeded`
    /// propagates to the caller, but only after entries that did succeed have
    /// been merged and persisted.
    pub async fn refresh(
        &self,
        asset_ids: &[String],
        currencies: &[String],
    ) -> Result<RefreshOutcome> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.store.load()?;
        self.refresh_loaded(&mut snapshot, asset_ids, currencies)
            .await
    }

    /// Last-chance path for a single asset when the snapshot itself cannot be
    /// read: fetch directly, then write the result into a freshly loaded
    /// snapshot on a best-effort basis.
    pub async fn fetch_direct(&self, asset_id: &str, currencies: &[String]) -> Result<CachedRate> {
        let _guard = self.lock.lock().await;
        info!("Fetching {} directly from the provider, bypassing the cache", asset_id);

        let ids = vec![asset_id.to_string()];
        let mut fetched = self.fetcher.fetch(&ids, currencies).await?;
        let rates = fetched
            .remove(asset_id)
            .filter(|rates| !rates.is_empty())
            .ok_or_else(|| RateError::not_found([asset_id]))?;

        let now = Utc::now();
        let entry = CachedRate::new(asset_id, rates, now);

        let mut snapshot = self.store.load().unwrap_or_default();
        snapshot.upsert(entry.clone());
        snapshot.global_last_updated = Some(now);
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Could not persist bypass result for {}: {}", asset_id, e);
        }

        Ok(entry)
    }

    async fn refresh_loaded(
        &self,
        snapshot: &mut RateSnapshot,
        asset_ids: &[String],
        currencies: &[String],
    ) -> Result<RefreshOutcome> {
        let now = Utc::now();

        let mut requested: Vec<String> = Vec::new();
        for id in asset_ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }

        let mut serve_ids: Vec<String> = Vec::new();
        let mut fetch_jobs: Vec<(String, RefreshAction, Vec<String>)> = Vec::new();
        for id in &requested {
            let action = plan(snapshot.entry(id), currencies, self.ttl, now);
            match &action {
                RefreshAction::ServeAsIs => serve_ids.push(id.clone()),
                RefreshAction::FullRefresh(fetch)
                | RefreshAction::PartialFetch(fetch)
                | RefreshAction::Create(fetch) => {
                    fetch_jobs.push((id.clone(), action.clone(), fetch.clone()));
                }
            }
        }

        if !serve_ids.is_empty() {
            debug!("Not refreshing rates for: {}", serve_ids.join(", "));
        }
        if !fetch_jobs.is_empty() {
            let refresh_ids: Vec<&str> = fetch_jobs.iter().map(|(id, _, _)| id.as_str()).collect();
            info!("Refreshing rates for: {}", refresh_ids.join(", "));
        }

        // One provider call per asset; distinct assets fetch concurrently.
        let calls = fetch_jobs.iter().map(|(id, _, fetch_currencies)| {
            let ids = vec![id.clone()];
            async move { self.fetcher.fetch(&ids, fetch_currencies).await }
        });
        let results = join_all(calls).await;

        let mut changed = false;
        let mut unresolved: Vec<(String, RateError)> = Vec::new();
        for ((id, action, _), result) in fetch_jobs.into_iter().zip(results) {
            match result {
                Ok(mut fetched) => match fetched.remove(&id).filter(|rates| !rates.is_empty()) {
                    Some(rates) => {
                        match action {
                            // Union-merge keeps every previously known
                            // currency; fetched values win on overlap.
                            RefreshAction::PartialFetch(_) => snapshot.merge(&id, rates, now),
                            _ => snapshot.upsert(CachedRate::new(&id, rates, now)),
                        }
                        changed = true;
                    }
                    None if matches!(action, RefreshAction::Create(_)) => {
                        debug!("Provider returned no rates for {}", id);
                        unresolved.push((id.clone(), RateError::not_found([id])));
                    }
                    None => {
                        // The provider knows the asset but had no quotes for
                        // the requested currencies; the cached entry stands.
                        debug!("Provider returned no new rates for {}, keeping cached entry", id);
                    }
                },
                Err(e) => {
                    warn!("Fetch failed for {}: {}", id, e);
                    unresolved.push((id, e));
                }
            }
        }

        if changed {
            snapshot.global_last_updated = Some(now);
            self.store.save(snapshot)?;
        }

        // Throttling aborts the call, but never the work already persisted.
        if let Some(pos) = unresolved
            .iter()
            .position(|(_, e)| matches!(e, RateError::RateLimitExceeded { .. }))
        {
            return Err(unresolved.swap_remove(pos).1);
        }

        let rates = requested
            .iter()
            .filter(|id| !unresolved.iter().any(|(failed, _)| failed == *id))
            .filter_map(|id| snapshot.entry(id).cloned())
            .collect();

        Ok(RefreshOutcome { rates, unresolved })
    }
}
