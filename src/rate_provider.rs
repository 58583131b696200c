//! Provides external exchange-rate lookups for the application.

use crate::error::Result;
use crate::model::CurrencyRateMap;
use async_trait::async_trait;
use std::collections::HashMap;

/// Rates returned by one provider call, keyed by asset id. An asset the
/// provider did not recognize is simply absent from the map.
pub type FetchedRates = HashMap<String, CurrencyRateMap>;

#[async_trait]
pub trait RateFetcher: Send + Sync {
    /// Fetches rates for the given assets against the given currencies in a
    /// single provider call.
    ///
    /// Fails with `AssetNotFound` when the provider recognizes none of the
    /// requested ids, `RateLimitExceeded` on throttling, and
    /// `ProviderUnavailable` for any other transport or provider error.
    ///
    /// A successful multi-asset call returns only the ids the provider
    /// recognized: callers requesting several assets at once must diff the
    /// returned keys against their request to treat the omitted ids as not
    /// found.
    async fn fetch(&self, asset_ids: &[String], currencies: &[String]) -> Result<FetchedRates>;
}
