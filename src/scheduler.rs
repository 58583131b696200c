//! Periodic background refresh of every cached asset.

use crate::error::Result;
use crate::service::RateService;
use std::time::Duration;
use tracing::{error, info};

/// One scheduler pass: re-resolve every cached asset and discard the rates.
/// Returns how many assets resolved.
pub async fn refresh_once(service: &RateService, currencies: &[String]) -> Result<usize> {
    let rates = service.get_all(currencies).await?;
    Ok(rates.len())
}

/// Runs [`refresh_once`] on a fixed interval. Query errors are logged and the
/// loop keeps going; the cache write is the point, the results are discarded.
pub async fn run_refresh_loop(service: &RateService, interval: Duration, currencies: &[String]) -> ! {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately, which doubles as a startup refresh.
    loop {
        ticker.tick().await;
        info!("Starting scheduled rate refresh");
        match refresh_once(service, currencies).await {
            Ok(count) => info!("Rate refresh completed for {} assets", count),
            Err(e) => error!("Scheduled rate refresh failed: {}", e),
        }
    }
}
