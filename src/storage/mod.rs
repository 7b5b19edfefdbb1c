//! Persistence for journeys and their priced items
//!
//! The aggregator and the journey service only see the [`Storage`] trait;
//! [`JsonStore`] is the file-backed implementation used by the binary.

pub mod json_store;

use async_trait::async_trait;

use crate::Result;
use crate::models::{
    Attraction, ConvertedPrice, ItemId, ItemKind, Journey, JourneyId, Stop, Transport,
};

pub use json_store::JsonStore;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_journey(&self, id: JourneyId) -> Result<Option<Journey>>;

    async fn list_journeys(&self) -> Result<Vec<Journey>>;

    /// Assigns the id (and creation time if unset) and returns the stored row
    async fn insert_journey(&self, journey: Journey) -> Result<Journey>;

    async fn update_journey(&self, journey: Journey) -> Result<Journey>;

    /// Overwrites the cached aggregate, leaving every other field untouched
    async fn update_journey_total(&self, id: JourneyId, total: f64) -> Result<()>;

    async fn get_stop(&self, id: ItemId) -> Result<Option<Stop>>;

    async fn list_stops_by_journey(&self, journey_id: JourneyId) -> Result<Vec<Stop>>;

    async fn insert_stop(&self, stop: Stop) -> Result<Stop>;

    async fn update_stop(&self, stop: Stop) -> Result<Stop>;

    /// Removes the stop together with its attractions
    async fn delete_stop(&self, id: ItemId) -> Result<Option<Stop>>;

    async fn get_transport(&self, id: ItemId) -> Result<Option<Transport>>;

    async fn list_transports_by_journey(&self, journey_id: JourneyId) -> Result<Vec<Transport>>;

    async fn insert_transport(&self, transport: Transport) -> Result<Transport>;

    async fn update_transport(&self, transport: Transport) -> Result<Transport>;

    async fn delete_transport(&self, id: ItemId) -> Result<Option<Transport>>;

    async fn get_attraction(&self, id: ItemId) -> Result<Option<Attraction>>;

    async fn list_attractions_by_stop(&self, stop_id: ItemId) -> Result<Vec<Attraction>>;

    async fn insert_attraction(&self, attraction: Attraction) -> Result<Attraction>;

    async fn update_attraction(&self, attraction: Attraction) -> Result<Attraction>;

    async fn delete_attraction(&self, id: ItemId) -> Result<Option<Attraction>>;

    /// Writes the derived price of one item in the journey's reporting currency
    async fn update_converted_price(
        &self,
        kind: ItemKind,
        id: ItemId,
        price: &ConvertedPrice,
    ) -> Result<()>;
}
