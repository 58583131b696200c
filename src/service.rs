//! The public query surface over the cache coordinator.

use crate::coordinator::RateCacheCoordinator;
use crate::error::{RateError, Result};
use crate::model::CachedRate;
use tracing::{info, warn};

/// The three read operations callers use. All of them may refresh and persist
/// rates as a side effect.
pub struct RateService {
    coordinator: RateCacheCoordinator,
}

impl RateService {
    pub fn new(coordinator: RateCacheCoordinator) -> Self {
        Self { coordinator }
    }

    /// Resolves every asset currently in the snapshot against the requested
    /// currencies. Nothing is created here: an empty cache yields an empty
    /// result.
    pub async fn get_all(&self, currencies: &[String]) -> Result<Vec<CachedRate>> {
        let asset_ids = self.coordinator.cached_asset_ids().await?;
        if asset_ids.is_empty() {
            info!("No cached assets to refresh");
            return Ok(Vec::new());
        }
        self.get_by_ids(&asset_ids, currencies).await
    }

    /// The general batch path: returns whatever subset of assets resolved,
    /// logging the ones that did not.
    pub async fn get_by_ids(
        &self,
        asset_ids: &[String],
        currencies: &[String],
    ) -> Result<Vec<CachedRate>> {
        let outcome = self.coordinator.refresh(asset_ids, currencies).await?;
        for (id, error) in &outcome.unresolved {
            warn!("Could not resolve {}: {}", id, error);
        }
        Ok(outcome.rates)
    }

    /// Single-asset query. Returns `Ok(None)` when the provider does not
    /// recognize the asset; transient provider failures stay errors so the
    /// caller can retry later.
    ///
    /// When the snapshot itself cannot be read, falls back to one direct
    /// provider fetch and rebuilds the entry in a fresh snapshot instead of
    /// surfacing the I/O error.
    pub async fn get_by_id(
        &self,
        asset_id: &str,
        currencies: &[String],
    ) -> Result<Option<CachedRate>> {
        let ids = vec![asset_id.to_string()];
        match self.coordinator.refresh(&ids, currencies).await {
            Ok(mut outcome) => {
                if let Some(rate) = outcome.rates.pop() {
                    return Ok(Some(rate));
                }
                match outcome.unresolved.pop() {
                    Some((_, RateError::AssetNotFound { .. })) | None => Ok(None),
                    Some((_, error)) => Err(error),
                }
            }
            Err(RateError::StoreUnavailable(store_error)) => {
                warn!(
                    "Rate store unavailable ({}), trying a direct fetch for {}",
                    store_error, asset_id
                );
                match self.coordinator.fetch_direct(asset_id, currencies).await {
                    Ok(rate) => Ok(Some(rate)),
                    Err(RateError::AssetNotFound { .. }) => Ok(None),
                    Err(error) => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CachedRate, RateSnapshot};
    use crate::rate_provider::{FetchedRates, RateFetcher};
    use crate::store::RateStore;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FixedFetcher {
        rates: FetchedRates,
        error: Option<fn() -> RateError>,
        call_count: AtomicUsize,
    }

    impl FixedFetcher {
        fn returning(rates: &[(&str, &[(&str, f64)])]) -> Self {
            let rates = rates
                .iter()
                .map(|(id, pairs)| {
                    (
                        id.to_string(),
                        pairs
                            .iter()
                            .map(|(currency, value)| (currency.to_string(), *value))
                            .collect(),
                    )
                })
                .collect();
            Self {
                rates,
                error: None,
                call_count: AtomicUsize::new(0),
            }
        }

        fn failing(error: fn() -> RateError) -> Self {
            Self {
                rates: FetchedRates::new(),
                error: Some(error),
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateFetcher for FixedFetcher {
        async fn fetch(
            &self,
            asset_ids: &[String],
            currencies: &[String],
        ) -> crate::error::Result<FetchedRates> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(make_error) = self.error {
                return Err(make_error());
            }
            let mut fetched = FetchedRates::new();
            for id in asset_ids {
                if let Some(known) = self.rates.get(id) {
                    let subset: HashMap<String, f64> = currencies
                        .iter()
                        .filter_map(|c| known.get(c).map(|v| (c.clone(), *v)))
                        .collect();
                    if !subset.is_empty() {
                        fetched.insert(id.clone(), subset);
                    }
                }
            }
            Ok(fetched)
        }
    }

    fn service_with(dir: &std::path::Path, fetcher: FixedFetcher) -> RateService {
        let coordinator = RateCacheCoordinator::new(
            RateStore::new(dir.join("rates.json")),
            Arc::new(fetcher),
            Duration::seconds(60),
        );
        RateService::new(coordinator)
    }

    fn currencies(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn test_get_by_id_creates_entry_on_empty_cache() {
        let dir = tempdir().unwrap();
        let service = service_with(
            dir.path(),
            FixedFetcher::returning(&[("bitcoin", &[("usd", 50000.0)])]),
        );

        let rate = service
            .get_by_id("bitcoin", &currencies(&["usd"]))
            .await
            .unwrap()
            .expect("expected an entry");
        assert_eq!(rate.id, "bitcoin");
        assert_eq!(rate.currency_rate_map["usd"], 50000.0);
    }

    #[tokio::test]
    async fn test_get_by_id_unknown_asset_is_none() {
        let dir = tempdir().unwrap();
        let service = service_with(dir.path(), FixedFetcher::returning(&[]));

        let result = service
            .get_by_id("no-such-coin", &currencies(&["usd"]))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_by_id_rate_limit_propagates() {
        let dir = tempdir().unwrap();
        let service = service_with(
            dir.path(),
            FixedFetcher::failing(|| RateError::RateLimitExceeded {
                provider: "CoinGecko".to_string(),
            }),
        );

        let err = service
            .get_by_id("bitcoin", &currencies(&["usd"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RateError::RateLimitExceeded { .. }));
        assert!(!dir.path().join("rates.json").exists());
    }

    #[tokio::test]
    async fn test_get_by_id_bypasses_unreadable_store() {
        let dir = tempdir().unwrap();
        // A corrupt snapshot makes the initial load fail.
        std::fs::write(dir.path().join("rates.json"), "not json").unwrap();
        let service = service_with(
            dir.path(),
            FixedFetcher::returning(&[("bitcoin", &[("usd", 50000.0)])]),
        );

        let rate = service
            .get_by_id("bitcoin", &currencies(&["usd"]))
            .await
            .unwrap()
            .expect("bypass should produce an entry");
        assert_eq!(rate.currency_rate_map["usd"], 50000.0);

        // The bypass rebuilt a valid snapshot.
        let persisted = RateStore::new(dir.path().join("rates.json")).load().unwrap();
        assert!(persisted.entry("bitcoin").is_some());
    }

    #[tokio::test]
    async fn test_get_by_ids_partial_success() {
        let dir = tempdir().unwrap();
        let service = service_with(
            dir.path(),
            FixedFetcher::returning(&[("bitcoin", &[("usd", 50000.0)])]),
        );

        let rates = service
            .get_by_ids(
                &["bitcoin".to_string(), "no-such-coin".to_string()],
                &currencies(&["usd"]),
            )
            .await
            .unwrap();

        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].id, "bitcoin");
    }

    #[tokio::test]
    async fn test_get_all_on_empty_cache_makes_no_calls() {
        let dir = tempdir().unwrap();
        let fetcher = FixedFetcher::returning(&[("bitcoin", &[("usd", 50000.0)])]);
        let service = service_with(dir.path(), fetcher);

        let rates = service.get_all(&currencies(&["usd"])).await.unwrap();
        assert!(rates.is_empty());
    }

    #[tokio::test]
    async fn test_get_all_refreshes_every_cached_asset() {
        let dir = tempdir().unwrap();
        let store = RateStore::new(dir.path().join("rates.json"));
        let mut snapshot = RateSnapshot::default();
        let stale = Utc::now() - Duration::seconds(120);
        snapshot.upsert(CachedRate::new(
            "bitcoin",
            HashMap::from([("usd".to_string(), 50000.0)]),
            stale,
        ));
        snapshot.upsert(CachedRate::new(
            "ethereum",
            HashMap::from([("usd".to_string(), 3000.0)]),
            stale,
        ));
        snapshot.global_last_updated = Some(stale);
        store.save(&snapshot).unwrap();

        let service = service_with(
            dir.path(),
            FixedFetcher::returning(&[
                ("bitcoin", &[("usd", 51000.0)]),
                ("ethereum", &[("usd", 3100.0)]),
            ]),
        );

        let rates = service.get_all(&currencies(&["usd"])).await.unwrap();
        assert_eq!(rates.len(), 2);
        let bitcoin = rates.iter().find(|r| r.id == "bitcoin").unwrap();
        assert_eq!(bitcoin.currency_rate_map["usd"], 51000.0);
    }
}
