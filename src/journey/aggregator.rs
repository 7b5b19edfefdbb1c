//! Journey cost aggregation
//!
//! Converts every priced item of a journey into the journey's reporting
//! currency, writes the converted values back, and stores the sum as the
//! journey's `total_estimated_cost`.
//!
//! Failures on a single item never abort the run: a failed conversion falls
//! back to the raw amount (and is reported in [`CostSummary::warnings`]), a
//! failed write-back is logged and skipped. Only loading the journey and
//! writing the final total can fail the whole computation.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::currency::CurrencyService;
use crate::models::{
    ConvertedPrice, CostBearing, CurrencyCode, ItemId, ItemKind, JourneyId, effective_currency,
};
use crate::storage::Storage;
use crate::{PlannerError, Result};

/// Round to cents, the precision converted prices and totals are stored at
#[must_use]
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// An item whose price went into the total unconverted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionWarning {
    pub kind: ItemKind,
    pub item_id: ItemId,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub journey_id: JourneyId,
    pub currency: CurrencyCode,
    /// Stored total, rounded to cents
    pub total: f64,
    pub stops_total: f64,
    pub transports_total: f64,
    pub attractions_total: f64,
    pub warnings: Vec<ConversionWarning>,
}

impl CostSummary {
    #[must_use]
    pub fn is_fully_converted(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub struct CostAggregator {
    storage: Arc<dyn Storage>,
    currency: Arc<CurrencyService>,
    default_currency: CurrencyCode,
}

impl CostAggregator {
    pub fn new(
        storage: Arc<dyn Storage>,
        currency: Arc<CurrencyService>,
        default_currency: CurrencyCode,
    ) -> Self {
        Self {
            storage,
            currency,
            default_currency,
        }
    }

    #[must_use]
    pub fn default_currency(&self) -> &CurrencyCode {
        &self.default_currency
    }

    #[instrument(skip(self))]
    pub async fn compute_and_persist_total(&self, journey_id: JourneyId) -> Result<CostSummary> {
        let journey = self
            .storage
            .get_journey(journey_id)
            .await?
            .ok_or(PlannerError::JourneyNotFound { id: journey_id })?;
        let main = journey.reporting_currency(&self.default_currency);
        let mut warnings = Vec::new();

        let stops = self.storage.list_stops_by_journey(journey_id).await?;
        let stops_total = self.sum_items(&stops, &main, &mut warnings).await;

        let transports = self.storage.list_transports_by_journey(journey_id).await?;
        let transports_total = self.sum_items(&transports, &main, &mut warnings).await;

        let mut attractions_total = 0.0;
        for stop in &stops {
            let attractions = self.storage.list_attractions_by_stop(stop.id).await?;
            attractions_total += self.sum_items(&attractions, &main, &mut warnings).await;
        }

        let total = round_cents(stops_total + transports_total + attractions_total);
        self.storage.update_journey_total(journey_id, total).await?;

        info!(
            journey_id,
            currency = %main,
            total,
            warnings = warnings.len(),
            "Journey total recomputed"
        );

        Ok(CostSummary {
            journey_id,
            currency: main,
            total,
            stops_total,
            transports_total,
            attractions_total,
            warnings,
        })
    }

    async fn sum_items<T>(
        &self,
        items: &[T],
        main: &CurrencyCode,
        warnings: &mut Vec<ConversionWarning>,
    ) -> f64
    where
        T: CostBearing + Sync,
    {
        let mut sum = 0.0;
        for item in items {
            let value = self.value_in(item, main, warnings).await;
            self.write_back(T::KIND, item.id(), value, main).await;
            sum += value;
        }
        sum
    }

    /// The item's chargeable amount in `main`, or the raw amount if conversion fails
    async fn value_in<T: CostBearing + Sync>(
        &self,
        item: &T,
        main: &CurrencyCode,
        warnings: &mut Vec<ConversionWarning>,
    ) -> f64 {
        let amount = item.chargeable_amount();
        if amount == 0.0 {
            return 0.0;
        }

        let from = effective_currency(item.currency(), main);
        if &from == main {
            return amount;
        }

        match self.currency.convert(amount, &from, main).await {
            Ok(converted) => converted,
            Err(e) => {
                let kind = T::KIND;
                warn!(
                    kind = %kind,
                    item_id = item.id(),
                    from = %from,
                    to = %main,
                    error = %e,
                    "Conversion failed, counting the unconverted amount"
                );
                warnings.push(ConversionWarning {
                    kind,
                    item_id: item.id(),
                    from,
                    to: main.clone(),
                    reason: e.to_string(),
                });
                amount
            }
        }
    }

    async fn write_back(&self, kind: ItemKind, id: ItemId, value: f64, main: &CurrencyCode) {
        let price = ConvertedPrice {
            amount: round_cents(value),
            currency: main.clone(),
        };
        if let Err(e) = self.storage.update_converted_price(kind, id, &price).await {
            warn!(kind = %kind, item_id = id, error = %e, "Failed to store converted price");
        } else {
            debug!(kind = %kind, item_id = id, amount = price.amount, "Converted price stored");
        }
    }
}
