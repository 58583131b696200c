pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod log;
pub mod model;
pub mod providers;
pub mod rate_provider;
pub mod scheduler;
pub mod service;
pub mod staleness;
pub mod store;

use crate::cli::{rates, ui};
use crate::config::AppConfig;
use crate::coordinator::RateCacheCoordinator;
use crate::error::RateError;
use crate::model::parse_currencies;
use crate::providers::CoinGeckoProvider;
use crate::service::RateService;
use crate::store::RateStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    /// Resolve one asset.
    Get { id: String, currencies: Option<String> },
    /// Resolve every cached asset.
    List { currencies: Option<String> },
    /// Run the periodic refresh loop in the foreground.
    Watch { currencies: Option<String> },
}

/// Wires the provider, store and coordinator together from configuration.
pub fn build_service(config: &AppConfig) -> Result<RateService> {
    let (base_url, api_key) = match &config.providers.coingecko {
        Some(provider) => (provider.base_url.as_str(), provider.api_key.as_deref()),
        None => ("https://api.coingecko.com/api/v3", None),
    };
    let fetcher = CoinGeckoProvider::new(base_url, api_key)?;

    let store = RateStore::new(config.rates_path()?);
    let ttl = chrono::Duration::seconds(config.cache_ttl_secs as i64);
    let coordinator = RateCacheCoordinator::new(store, Arc::new(fetcher), ttl);
    Ok(RateService::new(coordinator))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("coincache starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let service = build_service(&config)?;

    match command {
        AppCommand::Get { id, currencies } => {
            let currencies = parse_currencies(currencies.as_deref().unwrap_or(&config.currency));
            let spinner = ui::new_spinner(&format!("Fetching rates for {id}..."));
            let result = service.get_by_id(&id, &currencies).await;
            spinner.finish_and_clear();

            match result {
                Ok(Some(rate)) => {
                    rates::print_rates(&format!("Rates for {id}"), &[rate], &currencies);
                }
                Ok(None) => {
                    println!(
                        "{}",
                        ui::style_text(
                            &RateError::not_found([id.as_str()]).to_string(),
                            ui::StyleType::Error,
                        )
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        AppCommand::List { currencies } => {
            let currencies = parse_currencies(currencies.as_deref().unwrap_or(&config.currency));
            let spinner = ui::new_spinner("Refreshing cached rates...");
            let result = service.get_all(&currencies).await;
            spinner.finish_and_clear();

            let all_rates = result?;
            rates::print_rates("Cached rates", &all_rates, &currencies);
        }
        AppCommand::Watch { currencies } => {
            let currencies = parse_currencies(currencies.as_deref().unwrap_or(&config.currency));
            let interval = Duration::from_secs(config.refresh_interval_secs);
            info!("Refreshing cached assets every {}s", config.refresh_interval_secs);
            scheduler::run_refresh_loop(&service, interval, &currencies).await
        }
    }

    Ok(())
}
