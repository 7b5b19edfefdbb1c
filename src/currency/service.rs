//! Cached exchange rates and conversions
//!
//! Rates are served from the [`RateCacheStore`] whenever a snapshot for the
//! requested base exists; the upstream provider is only contacted on a miss
//! or an explicit refresh. Cross rates go through a single USD snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::provider::RateProvider;
use crate::cache::RateCacheStore;
use crate::models::{CurrencyCode, ExchangeRateSnapshot};
use crate::{PlannerError, Result};

pub struct CurrencyService {
    cache: Arc<RateCacheStore>,
    provider: Arc<dyn RateProvider>,
    /// Read-path TTL. `None` keeps cached snapshots forever.
    ttl: Option<Duration>,
}

impl CurrencyService {
    pub fn new(cache: Arc<RateCacheStore>, provider: Arc<dyn RateProvider>) -> Self {
        Self {
            cache,
            provider,
            ttl: None,
        }
    }

    /// Treat snapshots older than `ttl` as cache misses
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Rates for `base`, fetching upstream only when nothing usable is cached.
    ///
    /// Never fails: without cache and upstream the result can only convert
    /// `base` into itself.
    #[instrument(skip(self, base), fields(base = %base))]
    pub async fn get_rates(&self, base: &CurrencyCode) -> ExchangeRateSnapshot {
        let cached = self.cache.load(base).await;

        let stale = match cached {
            Some(snapshot) if !self.is_stale(&snapshot) => {
                debug!("Serving cached rates");
                return snapshot;
            }
            Some(snapshot) => {
                debug!(timestamp = snapshot.timestamp, "Cached rates expired");
                Some(snapshot)
            }
            None => None,
        };

        match self.fetch_and_store(base).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Could not fetch latest rates");
                stale.unwrap_or_else(|| ExchangeRateSnapshot::identity(base.clone()))
            }
        }
    }

    /// Cached rates only; never touches the network.
    pub async fn get_cached_rates(&self, base: &CurrencyCode) -> Option<ExchangeRateSnapshot> {
        self.cache.load(base).await
    }

    /// Multiplier turning an amount in `from` into `to`.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub async fn get_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }

        let pivot = self.get_rates(&CurrencyCode::usd()).await;
        if let (Some(rate_from), Some(rate_to)) = (pivot.rate_for(from), pivot.rate_for(to)) {
            // 1 FROM = 1/rate_from USD, 1 USD = rate_to TO
            return Ok((1.0 / rate_from) * rate_to);
        }

        debug!("Pair missing from pivot snapshot, trying a direct fetch");
        match self.fetch_and_store(from).await {
            Ok(direct) => {
                if let Some(rate) = direct.rate_for(to) {
                    return Ok(rate);
                }
            }
            Err(e) => debug!(error = %e, "Direct rate fetch failed"),
        }

        Err(PlannerError::rate_unavailable(from, to))
    }

    pub async fn convert(&self, amount: f64, from: &CurrencyCode, to: &CurrencyCode) -> Result<f64> {
        let rate = self.get_rate(from, to).await?;
        Ok(amount * rate)
    }

    /// Fetch `base` upstream and overwrite its cache entry, whatever is cached.
    pub async fn force_refresh(&self, base: &CurrencyCode) -> Result<ExchangeRateSnapshot> {
        let snapshot = self.fetch_and_store(base).await?;
        info!(base = %base, provider = self.provider.name(), "Exchange rates refreshed");
        Ok(snapshot)
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await?;
        info!(path = %self.cache.path().display(), "Exchange rates cache cleared");
        Ok(())
    }

    fn is_stale(&self, snapshot: &ExchangeRateSnapshot) -> bool {
        self.ttl
            .is_some_and(|ttl| snapshot.is_older_than(ttl, Utc::now().timestamp_millis()))
    }

    async fn fetch_and_store(&self, base: &CurrencyCode) -> Result<ExchangeRateSnapshot> {
        let snapshot = self.provider.fetch_latest(base).await?;
        // A snapshot we failed to persist is still good for this call.
        if let Err(e) = self.cache.save(&snapshot).await {
            warn!(error = %e, base = %base, "Failed to save exchange rates cache");
        }
        Ok(snapshot)
    }
}
