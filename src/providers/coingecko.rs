use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::error::{RateError, Result};
use crate::rate_provider::{FetchedRates, RateFetcher};

pub const PROVIDER_NAME: &str = "CoinGecko";

/// CoinGeckoProvider implementation for RateFetcher, backed by the
/// `/simple/price` endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("coincache/1.0")
            .build()
            .map_err(|e| RateError::ProviderUnavailable(e.into()))?;

        Ok(CoinGeckoProvider {
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
            client,
        })
    }
}

#[async_trait]
impl RateFetcher for CoinGeckoProvider {
    #[instrument(
        name = "CoinGeckoFetch",
        skip(self),
        fields(assets = asset_ids.join(","), currencies = currencies.join(","))
    )]
    async fn fetch(&self, asset_ids: &[String], currencies: &[String]) -> Result<FetchedRates> {
        if asset_ids.is_empty() || currencies.is_empty() {
            return Ok(FetchedRates::new());
        }

        let url = format!("{}/simple/price", self.base_url);
        debug!("Requesting rates from {}", url);

        let mut request = self.client.get(&url).query(&[
            ("ids", asset_ids.join(",")),
            ("vs_currencies", currencies.join(",")),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            RateError::ProviderUnavailable(anyhow!(
                "Request error: {} for assets: {} URL: {}",
                e,
                asset_ids.join(","),
                url
            ))
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RateError::RateLimitExceeded {
                provider: PROVIDER_NAME.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RateError::ProviderUnavailable(anyhow!(
                "HTTP error: {} for assets: {}",
                status,
                asset_ids.join(",")
            )));
        }

        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| RateError::ProviderUnavailable(anyhow!("Failed to parse response: {e}")))?;

        if body.is_empty() {
            return Err(RateError::not_found(asset_ids.iter().cloned()));
        }

        // Non-finite or negative quotes are never usable, treat them as absent.
        let fetched = body
            .into_iter()
            .map(|(id, rates)| {
                let rates = rates
                    .into_iter()
                    .filter(|(_, value)| value.is_finite() && *value >= 0.0)
                    .collect();
                (id, rates)
            })
            .collect();

        Ok(fetched)
    }
}
