use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rates for one asset, keyed by lowercase currency code. A missing currency
/// means "unknown", never zero.
pub type CurrencyRateMap = HashMap<String, f64>;

/// One cached asset with its per-currency rates.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CachedRate {
    pub id: String,
    #[serde(rename = "currencyRateMap", default)]
    pub currency_rate_map: CurrencyRateMap,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
}

impl CachedRate {
    pub fn new(id: &str, rates: CurrencyRateMap, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            currency_rate_map: rates,
            last_updated: now,
        }
    }
}

/// The whole persisted cache, written and read as a single document.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RateSnapshot {
    #[serde(default)]
    pub rates: Vec<CachedRate>,
    #[serde(rename = "globalLastUpdated", default)]
    pub global_last_updated: Option<DateTime<Utc>>,
}

impl RateSnapshot {
    pub fn entry(&self, id: &str) -> Option<&CachedRate> {
        self.rates.iter().find(|rate| rate.id == id)
    }

    pub fn entry_mut(&mut self, id: &str) -> Option<&mut CachedRate> {
        self.rates.iter_mut().find(|rate| rate.id == id)
    }

    pub fn asset_ids(&self) -> Vec<String> {
        self.rates.iter().map(|rate| rate.id.clone()).collect()
    }

    /// Inserts or replaces the entry for `rate.id`, keeping ids unique.
    pub fn upsert(&mut self, rate: CachedRate) {
        match self.entry_mut(&rate.id) {
            Some(existing) => *existing = rate,
            None => self.rates.push(rate),
        }
    }

    /// Union-merges rates into the entry for `id`, inserting a new entry when
    /// none exists. Merged values win on overlap.
    pub fn merge(&mut self, id: &str, rates: CurrencyRateMap, now: DateTime<Utc>) {
        if let Some(index) = self.rates.iter().position(|rate| rate.id == id) {
            let entry = &mut self.rates[index];
            entry.currency_rate_map.extend(rates);
            entry.last_updated = now;
        } else {
            self.rates.push(CachedRate::new(id, rates, now));
        }
    }
}

/// Splits a comma-joined currency string into lowercase codes, dropping
/// empty segments and duplicates while preserving order.
pub fn parse_currencies(input: &str) -> Vec<String> {
    let mut currencies: Vec<String> = Vec::new();
    for part in input.split(',') {
        let code = part.trim().to_lowercase();
        if !code.is_empty() && !currencies.contains(&code) {
            currencies.push(code);
        }
    }
    currencies
}
