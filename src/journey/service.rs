//! Journey and item mutations
//!
//! Every change to a priced item is committed first, then the owning
//! journey's total is recomputed and the change is broadcast. A failed
//! recomputation is returned to the caller but never rolls the item back.
//!
//! The item mutations are library entry points for an embedding application;
//! the bundled HTTP API and CLI only read journeys and trigger recomputes.
//! Subscribe through [`JourneyService::notifier`] to observe the broadcasts.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::aggregator::{CostAggregator, CostSummary};
use super::events::{JourneyEvent, JourneyNotifier};
use crate::models::{Attraction, ItemId, Journey, JourneyId, Stop, Transport};
use crate::storage::Storage;
use crate::{PlannerError, Result};

/// Outcome of recomputing every stored journey
#[derive(Debug, Default)]
pub struct RecomputeReport {
    pub summaries: Vec<CostSummary>,
    pub failures: Vec<(JourneyId, PlannerError)>,
}

pub struct JourneyService {
    storage: Arc<dyn Storage>,
    aggregator: Arc<CostAggregator>,
    notifier: JourneyNotifier,
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PlannerError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

impl JourneyService {
    pub fn new(
        storage: Arc<dyn Storage>,
        aggregator: Arc<CostAggregator>,
        notifier: JourneyNotifier,
    ) -> Self {
        Self {
            storage,
            aggregator,
            notifier,
        }
    }

    #[must_use]
    pub fn notifier(&self) -> &JourneyNotifier {
        &self.notifier
    }

    pub async fn create_journey(&self, mut journey: Journey) -> Result<Journey> {
        require_text("title", &journey.title)?;
        journey.total_estimated_cost = Some(0.0);
        let journey = self.storage.insert_journey(journey).await?;
        info!(journey_id = journey.id, "Journey created");
        self.notifier
            .publish(JourneyEvent::JourneyCreated(journey.clone()));
        Ok(journey)
    }

    pub async fn get_journey(&self, id: JourneyId) -> Result<Journey> {
        self.storage
            .get_journey(id)
            .await?
            .ok_or(PlannerError::JourneyNotFound { id })
    }

    pub async fn list_journeys(&self) -> Result<Vec<Journey>> {
        self.storage.list_journeys().await
    }

    /// Updates the journey's own fields. The stored total is kept; changing
    /// the reporting currency re-converts every item.
    #[instrument(skip(self, journey), fields(journey_id = journey.id))]
    pub async fn update_journey(&self, mut journey: Journey) -> Result<Journey> {
        require_text("title", &journey.title)?;
        let existing = self.get_journey(journey.id).await?;
        journey.total_estimated_cost = existing.total_estimated_cost;
        journey.created_at = existing.created_at;

        let currency_changed = journey.currency != existing.currency;
        let journey = self.storage.update_journey(journey).await?;

        if currency_changed {
            self.recompute(journey.id).await?;
            return self.get_journey(journey.id).await;
        }
        self.notifier
            .publish(JourneyEvent::JourneyUpdated(journey.clone()));
        Ok(journey)
    }

    pub async fn create_stop(&self, stop: Stop) -> Result<Stop> {
        require_text("city", &stop.city)?;
        self.get_journey(stop.journey_id).await?;
        let stop = self.storage.insert_stop(stop).await?;
        self.commit(stop.journey_id, JourneyEvent::StopCreated(stop.clone()))
            .await?;
        Ok(stop)
    }

    pub async fn update_stop(&self, stop: Stop) -> Result<Stop> {
        require_text("city", &stop.city)?;
        let previous = self
            .storage
            .get_stop(stop.id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Stop", stop.id))?;
        if previous.journey_id != stop.journey_id {
            self.get_journey(stop.journey_id).await?;
        }

        let stop = self.storage.update_stop(stop).await?;
        self.commit(stop.journey_id, JourneyEvent::StopUpdated(stop.clone()))
            .await?;
        if previous.journey_id != stop.journey_id {
            self.recompute(previous.journey_id).await?;
        }
        Ok(stop)
    }

    /// Deletes the stop and its attractions
    pub async fn delete_stop(&self, id: ItemId) -> Result<Stop> {
        let stop = self
            .storage
            .delete_stop(id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Stop", id))?;
        self.commit(
            stop.journey_id,
            JourneyEvent::StopDeleted {
                id,
                journey_id: stop.journey_id,
            },
        )
        .await?;
        Ok(stop)
    }

    pub async fn create_transport(&self, transport: Transport) -> Result<Transport> {
        require_text("from_location", &transport.from_location)?;
        require_text("to_location", &transport.to_location)?;
        self.get_journey(transport.journey_id).await?;
        let transport = self.storage.insert_transport(transport).await?;
        self.commit(
            transport.journey_id,
            JourneyEvent::TransportCreated(transport.clone()),
        )
        .await?;
        Ok(transport)
    }

    pub async fn update_transport(&self, transport: Transport) -> Result<Transport> {
        require_text("from_location", &transport.from_location)?;
        require_text("to_location", &transport.to_location)?;
        let previous = self
            .storage
            .get_transport(transport.id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Transport", transport.id))?;
        if previous.journey_id != transport.journey_id {
            self.get_journey(transport.journey_id).await?;
        }

        let transport = self.storage.update_transport(transport).await?;
        self.commit(
            transport.journey_id,
            JourneyEvent::TransportUpdated(transport.clone()),
        )
        .await?;
        if previous.journey_id != transport.journey_id {
            self.recompute(previous.journey_id).await?;
        }
        Ok(transport)
    }

    pub async fn delete_transport(&self, id: ItemId) -> Result<Transport> {
        let transport = self
            .storage
            .delete_transport(id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Transport", id))?;
        self.commit(
            transport.journey_id,
            JourneyEvent::TransportDeleted {
                id,
                journey_id: transport.journey_id,
            },
        )
        .await?;
        Ok(transport)
    }

    pub async fn create_attraction(&self, attraction: Attraction) -> Result<Attraction> {
        require_text("name", &attraction.name)?;
        let journey_id = self.journey_of_stop(attraction.stop_id).await?;
        let attraction = self.storage.insert_attraction(attraction).await?;
        self.commit(
            journey_id,
            JourneyEvent::AttractionCreated(attraction.clone()),
        )
        .await?;
        Ok(attraction)
    }

    pub async fn update_attraction(&self, attraction: Attraction) -> Result<Attraction> {
        require_text("name", &attraction.name)?;
        let previous = self
            .storage
            .get_attraction(attraction.id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Attraction", attraction.id))?;
        let journey_id = self.journey_of_stop(attraction.stop_id).await?;
        let previous_journey = if previous.stop_id == attraction.stop_id {
            None
        } else {
            self.storage
                .get_stop(previous.stop_id)
                .await?
                .map(|stop| stop.journey_id)
                .filter(|id| *id != journey_id)
        };

        let attraction = self.storage.update_attraction(attraction).await?;
        self.commit(
            journey_id,
            JourneyEvent::AttractionUpdated(attraction.clone()),
        )
        .await?;
        if let Some(previous_journey) = previous_journey {
            self.recompute(previous_journey).await?;
        }
        Ok(attraction)
    }

    pub async fn delete_attraction(&self, id: ItemId) -> Result<Attraction> {
        let attraction = self
            .storage
            .delete_attraction(id)
            .await?
            .ok_or_else(|| PlannerError::not_found("Attraction", id))?;
        let event = JourneyEvent::AttractionDeleted {
            id,
            stop_id: attraction.stop_id,
        };

        match self.storage.get_stop(attraction.stop_id).await? {
            Some(stop) => self.commit(stop.journey_id, event).await?,
            None => {
                warn!(attraction_id = id, stop_id = attraction.stop_id, "Deleted attraction had no stop");
                self.notifier.publish(event);
            }
        }
        Ok(attraction)
    }

    /// Recomputes one journey and broadcasts the refreshed journey
    pub async fn recompute(&self, journey_id: JourneyId) -> Result<CostSummary> {
        let summary = self.aggregator.compute_and_persist_total(journey_id).await?;
        self.publish_journey(journey_id).await;
        Ok(summary)
    }

    /// Recomputes every stored journey; one failing journey does not stop the rest
    #[instrument(skip(self))]
    pub async fn recompute_all(&self) -> Result<RecomputeReport> {
        let journeys = self.storage.list_journeys().await?;
        let mut report = RecomputeReport::default();

        for journey in journeys {
            match self.recompute(journey.id).await {
                Ok(summary) => report.summaries.push(summary),
                Err(e) => {
                    warn!(journey_id = journey.id, error = %e, "Failed to recompute journey");
                    report.failures.push((journey.id, e));
                }
            }
        }

        info!(
            recomputed = report.summaries.len(),
            failed = report.failures.len(),
            "Journey totals recomputed"
        );
        Ok(report)
    }

    async fn journey_of_stop(&self, stop_id: ItemId) -> Result<JourneyId> {
        self.storage
            .get_stop(stop_id)
            .await?
            .map(|stop| stop.journey_id)
            .ok_or_else(|| PlannerError::not_found("Stop", stop_id))
    }

    /// Post-mutation step shared by every item change
    async fn commit(&self, journey_id: JourneyId, event: JourneyEvent) -> Result<()> {
        let recomputed = self.aggregator.compute_and_persist_total(journey_id).await;
        self.notifier.publish(event);

        if let Err(e) = recomputed {
            warn!(journey_id, error = %e, "Item saved but journey total was not recomputed");
            return Err(e);
        }
        self.publish_journey(journey_id).await;
        Ok(())
    }

    async fn publish_journey(&self, journey_id: JourneyId) {
        match self.storage.get_journey(journey_id).await {
            Ok(Some(journey)) => self.notifier.publish(JourneyEvent::JourneyUpdated(journey)),
            Ok(None) => {}
            Err(e) => warn!(journey_id, error = %e, "Could not reload journey for broadcast"),
        }
    }
}
