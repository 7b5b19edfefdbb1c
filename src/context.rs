//! Wiring of the services shared by the CLI commands and the web server

use std::path::PathBuf;
use std::sync::Arc;

use crate::Result;
use crate::api::AppState;
use crate::cache::RateCacheStore;
use crate::config::PlannerConfig;
use crate::currency::{self, CurrencyService, RateProvider, RateRefresher, RefreshSchedule};
use crate::journey::{CostAggregator, JourneyNotifier, JourneyService};
use crate::storage::{JsonStore, Storage};

pub struct PlannerContext {
    pub config: PlannerConfig,
    pub currency: Arc<CurrencyService>,
    pub journeys: Arc<JourneyService>,
}

impl PlannerContext {
    /// JSON storage under `storage.data_dir` and the provider picked from the config
    pub fn from_config(config: PlannerConfig) -> Result<Self> {
        let storage = Arc::new(JsonStore::new(PathBuf::from(&config.storage.data_dir)));
        let provider = currency::from_config(&config.currency)?;
        Self::with_parts(config, storage, provider)
    }

    pub fn with_parts(
        config: PlannerConfig,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn RateProvider>,
    ) -> Result<Self> {
        let cache = Arc::new(RateCacheStore::new(PathBuf::from(
            &config.currency.cache_file,
        )));
        let currency = Arc::new(
            CurrencyService::new(cache, provider).with_ttl(config.currency.enforced_ttl()),
        );
        let aggregator = Arc::new(CostAggregator::new(
            storage.clone(),
            currency.clone(),
            config.currency.default_currency_code()?,
        ));
        let journeys = Arc::new(JourneyService::new(
            storage,
            aggregator,
            JourneyNotifier::new(),
        ));

        Ok(Self {
            config,
            currency,
            journeys,
        })
    }

    /// Refresher for the configured bases, ticking once per cache TTL
    pub fn refresher(&self) -> Result<RateRefresher> {
        let schedule = RefreshSchedule {
            interval: self.config.currency.cache_ttl(),
            bases: self.config.currency.refresh_base_codes()?,
        };
        Ok(RateRefresher::new(self.currency.clone(), schedule))
    }

    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState {
            currency: self.currency.clone(),
            journeys: self.journeys.clone(),
        }
    }
}
