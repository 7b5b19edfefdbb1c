//! Exchange rate snapshot model

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::CurrencyCode;

/// One cached set of rates for a base currency.
///
/// `rates[code]` reads as "1 unit of `base` = rate units of `code`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateSnapshot {
    pub base: CurrencyCode,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    pub rates: BTreeMap<String, f64>,
}

impl ExchangeRateSnapshot {
    /// Snapshot stamped with the current time. The base always maps to 1.
    #[must_use]
    pub fn new(base: CurrencyCode, mut rates: BTreeMap<String, f64>) -> Self {
        rates.insert(base.as_str().to_string(), 1.0);
        Self {
            base,
            timestamp: Utc::now().timestamp_millis(),
            rates,
        }
    }

    /// Degenerate snapshot that can only convert `base` into itself
    #[must_use]
    pub fn identity(base: CurrencyCode) -> Self {
        Self::new(base, BTreeMap::new())
    }

    /// Usable rate for `code`; zero, negative and non-finite entries count as missing
    #[must_use]
    pub fn rate_for(&self, code: &CurrencyCode) -> Option<f64> {
        self.rates
            .get(code.as_str())
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }

    /// Whether the snapshot was captured more than `ttl` before `now_ms`
    #[must_use]
    pub fn is_older_than(&self, ttl: Duration, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.timestamp) > ttl_ms
    }
}
