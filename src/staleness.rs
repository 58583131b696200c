//! Pure staleness decisions for cached rates.

use crate::model::CachedRate;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Whether a cached entry can serve a request, and what is missing if not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usability {
    /// True when the entry's age is within the TTL (inclusive).
    pub fresh: bool,
    /// Requested currencies absent from the entry's rate map.
    pub missing_currencies: BTreeSet<String>,
}

impl Usability {
    /// Serve straight from cache, no network call and no write.
    pub fn serve_as_is(&self) -> bool {
        self.fresh && self.missing_currencies.is_empty()
    }
}

/// Evaluates an entry (or its absence) against the requested currencies.
///
/// An absent entry is never fresh and misses every requested currency. An
/// entry whose age is exactly `ttl` is still fresh.
pub fn evaluate(
    entry: Option<&CachedRate>,
    requested_currencies: &[String],
    ttl: Duration,
    now: DateTime<Utc>,
) -> Usability {
    let Some(entry) = entry else {
        return Usability {
            fresh: false,
            missing_currencies: requested_currencies.iter().cloned().collect(),
        };
    };

    let fresh = now - entry.last_updated <= ttl;
    let missing_currencies = requested_currencies
        .iter()
        .filter(|currency| !entry.currency_rate_map.contains_key(*currency))
        .cloned()
        .collect();

    Usability {
        fresh,
        missing_currencies,
    }
}
