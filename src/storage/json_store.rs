//! JSON file storage
//!
//! Each table lives in `<data_dir>/<table>.json` as a plain array of rows.
//! Ids are assigned as `max(id) + 1`. Writes go through a temp file and a
//! rename and are serialized within the process.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::Storage;
use crate::models::{
    Attraction, ConvertedPrice, CostBearing, ItemId, ItemKind, Journey, JourneyId, Stop,
    Transport,
};
use crate::{PlannerError, Result};

trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const ENTITY: &'static str;

    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    fn extra_mut(&mut self) -> &mut Map<String, Value>;

    fn missing(id: i64) -> PlannerError {
        PlannerError::not_found(Self::ENTITY, id)
    }
}

impl Record for Journey {
    const TABLE: &'static str = "journeys";
    const ENTITY: &'static str = "Journey";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }

    fn missing(id: i64) -> PlannerError {
        PlannerError::JourneyNotFound { id }
    }
}

impl Record for Stop {
    const TABLE: &'static str = "stops";
    const ENTITY: &'static str = "Stop";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Record for Transport {
    const TABLE: &'static str = "transports";
    const ENTITY: &'static str = "Transport";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Record for Attraction {
    const TABLE: &'static str = "attractions";
    const ENTITY: &'static str = "Attraction";

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

pub struct JsonStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.data_dir.join(format!("{table}.json"))
    }

    async fn read_table<T: Record>(&self) -> Result<Vec<T>> {
        let path = self.table_path(T::TABLE);
        match fs::read(&path).await {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                PlannerError::storage(format!("{} is not a valid table: {e}", path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(PlannerError::storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn write_table<T: Record>(&self, rows: &[T]) -> Result<()> {
        let path = self.table_path(T::TABLE);
        let write_err =
            |e: std::io::Error| PlannerError::storage(format!("Failed to write {}: {e}", path.display()));

        fs::create_dir_all(&self.data_dir).await.map_err(write_err)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(rows)?)
            .await
            .map_err(write_err)?;
        fs::rename(&tmp, &path).await.map_err(write_err)?;
        debug!(table = T::TABLE, rows = rows.len(), "Table written");
        Ok(())
    }

    async fn find<T: Record>(&self, id: i64) -> Result<Option<T>> {
        Ok(self
            .read_table::<T>()
            .await?
            .into_iter()
            .find(|row| row.id() == id))
    }

    async fn filter<T: Record>(&self, keep: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        let mut rows: Vec<T> = self.read_table::<T>().await?;
        rows.retain(|row| keep(row));
        Ok(rows)
    }

    /// Read-modify-write of one table under the write lock
    async fn mutate<T, R, F>(&self, f: F) -> Result<R>
    where
        T: Record,
        R: Send,
        F: FnOnce(&mut Vec<T>) -> Result<R> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_table::<T>().await?;
        let out = f(&mut rows)?;
        self.write_table(&rows).await?;
        Ok(out)
    }

    async fn insert<T: Record>(&self, mut row: T) -> Result<T> {
        self.mutate(move |rows: &mut Vec<T>| {
            let next = rows.iter().map(Record::id).max().unwrap_or(0) + 1;
            row.set_id(next);
            rows.push(row.clone());
            Ok(row)
        })
        .await
    }

    /// Replaces the typed fields of a row; untyped columns the caller did not
    /// carry over are kept from the stored row
    async fn replace<T: Record>(&self, mut row: T) -> Result<T> {
        self.mutate(move |rows: &mut Vec<T>| {
            let slot = rows
                .iter_mut()
                .find(|existing| existing.id() == row.id())
                .ok_or_else(|| T::missing(row.id()))?;
            let stored = std::mem::take(slot.extra_mut());
            let extra = row.extra_mut();
            for (key, value) in stored {
                extra.entry(key).or_insert(value);
            }
            *slot = row.clone();
            Ok(row)
        })
        .await
    }

    async fn patch<T, F>(&self, id: i64, f: F) -> Result<()>
    where
        T: Record,
        F: FnOnce(&mut T) + Send,
    {
        self.mutate(move |rows: &mut Vec<T>| {
            let row = rows
                .iter_mut()
                .find(|existing| existing.id() == id)
                .ok_or_else(|| T::missing(id))?;
            f(row);
            Ok(())
        })
        .await
    }

    async fn remove<T: Record>(&self, id: i64) -> Result<Option<T>> {
        self.mutate(move |rows: &mut Vec<T>| {
            Ok(rows
                .iter()
                .position(|row| row.id() == id)
                .map(|index| rows.remove(index)))
        })
        .await
    }
}

#[async_trait]
impl Storage for JsonStore {
    async fn get_journey(&self, id: JourneyId) -> Result<Option<Journey>> {
        self.find(id).await
    }

    async fn list_journeys(&self) -> Result<Vec<Journey>> {
        self.read_table().await
    }

    async fn insert_journey(&self, mut journey: Journey) -> Result<Journey> {
        journey.created_at.get_or_insert_with(Utc::now);
        self.insert(journey).await
    }

    async fn update_journey(&self, journey: Journey) -> Result<Journey> {
        self.replace(journey).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn update_journey_total(&self, id: JourneyId, total: f64) -> Result<()> {
        self.patch(id, move |journey: &mut Journey| {
            journey.total_estimated_cost = Some(total);
        })
        .await
    }

    async fn get_stop(&self, id: ItemId) -> Result<Option<Stop>> {
        self.find(id).await
    }

    async fn list_stops_by_journey(&self, journey_id: JourneyId) -> Result<Vec<Stop>> {
        self.filter(|stop: &Stop| stop.journey_id == journey_id).await
    }

    async fn insert_stop(&self, stop: Stop) -> Result<Stop> {
        self.insert(stop).await
    }

    async fn update_stop(&self, stop: Stop) -> Result<Stop> {
        self.replace(stop).await
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_stop(&self, id: ItemId) -> Result<Option<Stop>> {
        // Both tables change under one lock so no attraction outlives its stop.
        let _guard = self.write_lock.lock().await;

        let mut stops: Vec<Stop> = self.read_table().await?;
        let Some(index) = stops.iter().position(|stop| stop.id == id) else {
            return Ok(None);
        };
        let removed = stops.remove(index);
        self.write_table(&stops).await?;

        let mut attractions: Vec<Attraction> = self.read_table().await?;
        let before = attractions.len();
        attractions.retain(|attraction| attraction.stop_id != id);
        if attractions.len() != before {
            self.write_table(&attractions).await?;
            debug!(
                stop_id = id,
                removed = before - attractions.len(),
                "Removed attractions of deleted stop"
            );
        }

        Ok(Some(removed))
    }

    async fn get_transport(&self, id: ItemId) -> Result<Option<Transport>> {
        self.find(id).await
    }

    async fn list_transports_by_journey(&self, journey_id: JourneyId) -> Result<Vec<Transport>> {
        self.filter(|transport: &Transport| transport.journey_id == journey_id)
            .await
    }

    async fn insert_transport(&self, transport: Transport) -> Result<Transport> {
        self.insert(transport).await
    }

    async fn update_transport(&self, transport: Transport) -> Result<Transport> {
        self.replace(transport).await
    }

    async fn delete_transport(&self, id: ItemId) -> Result<Option<Transport>> {
        self.remove(id).await
    }

    async fn get_attraction(&self, id: ItemId) -> Result<Option<Attraction>> {
        self.find(id).await
    }

    async fn list_attractions_by_stop(&self, stop_id: ItemId) -> Result<Vec<Attraction>> {
        self.filter(|attraction: &Attraction| attraction.stop_id == stop_id)
            .await
    }

    async fn insert_attraction(&self, attraction: Attraction) -> Result<Attraction> {
        self.insert(attraction).await
    }

    async fn update_attraction(&self, attraction: Attraction) -> Result<Attraction> {
        self.replace(attraction).await
    }

    async fn delete_attraction(&self, id: ItemId) -> Result<Option<Attraction>> {
        self.remove(id).await
    }

    #[instrument(level = "debug", skip(self, price), fields(amount = price.amount, currency = %price.currency))]
    async fn update_converted_price(
        &self,
        kind: ItemKind,
        id: ItemId,
        price: &ConvertedPrice,
    ) -> Result<()> {
        let price = price.clone();
        match kind {
            ItemKind::Stop => self.patch(id, move |stop: &mut Stop| stop.set_converted(price)).await,
            ItemKind::Transport => {
                self.patch(id, move |transport: &mut Transport| {
                    transport.set_converted(price);
                })
                .await
            }
            ItemKind::Attraction => {
                self.patch(id, move |attraction: &mut Attraction| {
                    attraction.set_converted(price);
                })
                .await
            }
        }
    }
}
