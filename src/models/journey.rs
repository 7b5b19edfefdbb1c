//! Journeys and the priced items they own

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CurrencyCode;
use super::currency::{deserialize_optional_amount, deserialize_optional_currency};

pub type JourneyId = i64;
pub type ItemId = i64;

/// A trip; the owner of stops and transports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    #[serde(default)]
    pub id: JourneyId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Reporting currency; the configured default applies when unset
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub currency: Option<CurrencyCode>,
    /// Cached aggregate, rewritten by every cost recomputation
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub total_estimated_cost: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Columns without a typed field here; written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Journey {
    #[must_use]
    pub fn new(title: impl Into<String>, currency: Option<CurrencyCode>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: None,
            start_date: None,
            end_date: None,
            currency,
            total_estimated_cost: None,
            created_at: None,
            extra: Map::new(),
        }
    }

    /// The journey's currency, or `fallback` if none was chosen
    #[must_use]
    pub fn reporting_currency(&self, fallback: &CurrencyCode) -> CurrencyCode {
        self.currency.clone().unwrap_or_else(|| fallback.clone())
    }
}

/// A place the journey stays at; carries the accommodation price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(default)]
    pub id: ItemId,
    pub journey_id: JourneyId,
    pub city: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub arrival_date: Option<NaiveDate>,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
    #[serde(default)]
    pub accommodation_name: Option<String>,
    #[serde(default)]
    pub accommodation_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub accommodation_price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub accommodation_currency: Option<CurrencyCode>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub accommodation_price_converted: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub accommodation_price_converted_currency: Option<CurrencyCode>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Stop {
    #[must_use]
    pub fn new(journey_id: JourneyId, city: impl Into<String>) -> Self {
        Self {
            id: 0,
            journey_id,
            city: city.into(),
            country: None,
            arrival_date: None,
            departure_date: None,
            accommodation_name: None,
            accommodation_url: None,
            accommodation_price: None,
            accommodation_currency: None,
            accommodation_price_converted: None,
            accommodation_price_converted_currency: None,
            is_paid: false,
            notes: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_price(mut self, amount: f64, currency: Option<CurrencyCode>) -> Self {
        self.accommodation_price = Some(amount);
        self.accommodation_currency = currency;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    Flight,
    Train,
    Bus,
    Car,
    Ferry,
    #[serde(other)]
    Other,
}

/// A leg between two places
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    #[serde(default)]
    pub id: ItemId,
    pub journey_id: JourneyId,
    #[serde(rename = "type")]
    pub transport_type: TransportType,
    pub from_location: String,
    pub to_location: String,
    #[serde(default)]
    pub departure_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrival_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub currency: Option<CurrencyCode>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub price_converted: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub price_converted_currency: Option<CurrencyCode>,
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transport {
    #[must_use]
    pub fn new(
        journey_id: JourneyId,
        transport_type: TransportType,
        from_location: impl Into<String>,
        to_location: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            journey_id,
            transport_type,
            from_location: from_location.into(),
            to_location: to_location.into(),
            departure_date: None,
            arrival_date: None,
            price: None,
            currency: None,
            price_converted: None,
            price_converted_currency: None,
            booking_url: None,
            is_paid: false,
            notes: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_price(mut self, amount: f64, currency: Option<CurrencyCode>) -> Self {
        self.price = Some(amount);
        self.currency = currency;
        self
    }
}

/// Something to do at a stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attraction {
    #[serde(default)]
    pub id: ItemId,
    pub stop_id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub estimated_cost: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub currency: Option<CurrencyCode>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    pub estimated_cost_converted: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_currency")]
    pub estimated_cost_converted_currency: Option<CurrencyCode>,
    #[serde(default)]
    pub is_paid: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Attraction {
    #[must_use]
    pub fn new(stop_id: ItemId, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            stop_id,
            name: name.into(),
            description: None,
            estimated_cost: None,
            currency: None,
            estimated_cost_converted: None,
            estimated_cost_converted_currency: None,
            is_paid: false,
            tags: Vec::new(),
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_cost(mut self, amount: f64, currency: Option<CurrencyCode>) -> Self {
        self.estimated_cost = Some(amount);
        self.currency = currency;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Stop,
    Transport,
    Attraction,
}

impl ItemKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Stop => "Stop",
            ItemKind::Transport => "Transport",
            ItemKind::Attraction => "Attraction",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An amount expressed in the journey's reporting currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedPrice {
    pub amount: f64,
    pub currency: CurrencyCode,
}

/// Uniform view over stops, transports and attractions for cost aggregation
pub trait CostBearing {
    const KIND: ItemKind;

    fn id(&self) -> ItemId;

    /// Raw price as entered, in `currency()`
    fn amount(&self) -> Option<f64>;

    fn currency(&self) -> Option<&CurrencyCode>;

    fn converted(&self) -> Option<ConvertedPrice>;

    fn set_converted(&mut self, price: ConvertedPrice);

    /// Price that counts towards a total; unset, negative and non-finite prices are free
    fn chargeable_amount(&self) -> f64 {
        self.amount()
            .filter(|amount| amount.is_finite() && *amount > 0.0)
            .unwrap_or(0.0)
    }
}

fn converted_pair(amount: Option<f64>, currency: Option<&CurrencyCode>) -> Option<ConvertedPrice> {
    Some(ConvertedPrice {
        amount: amount?,
        currency: currency?.clone(),
    })
}

impl CostBearing for Stop {
    const KIND: ItemKind = ItemKind::Stop;

    fn id(&self) -> ItemId {
        self.id
    }

    fn amount(&self) -> Option<f64> {
        self.accommodation_price
    }

    fn currency(&self) -> Option<&CurrencyCode> {
        self.accommodation_currency.as_ref()
    }

    fn converted(&self) -> Option<ConvertedPrice> {
        converted_pair(
            self.accommodation_price_converted,
            self.accommodation_price_converted_currency.as_ref(),
        )
    }

    fn set_converted(&mut self, price: ConvertedPrice) {
        self.accommodation_price_converted = Some(price.amount);
        self.accommodation_price_converted_currency = Some(price.currency);
    }
}

impl CostBearing for Transport {
    const KIND: ItemKind = ItemKind::Transport;

    fn id(&self) -> ItemId {
        self.id
    }

    fn amount(&self) -> Option<f64> {
        self.price
    }

    fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    fn converted(&self) -> Option<ConvertedPrice> {
        converted_pair(self.price_converted, self.price_converted_currency.as_ref())
    }

    fn set_converted(&mut self, price: ConvertedPrice) {
        self.price_converted = Some(price.amount);
        self.price_converted_currency = Some(price.currency);
    }
}

impl CostBearing for Attraction {
    const KIND: ItemKind = ItemKind::Attraction;

    fn id(&self) -> ItemId {
        self.id
    }

    fn amount(&self) -> Option<f64> {
        self.estimated_cost
    }

    fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    fn converted(&self) -> Option<ConvertedPrice> {
        converted_pair(
            self.estimated_cost_converted,
            self.estimated_cost_converted_currency.as_ref(),
        )
    }

    fn set_converted(&mut self, price: ConvertedPrice) {
        self.estimated_cost_converted = Some(price.amount);
        self.estimated_cost_converted_currency = Some(price.currency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::service::tests::code;

    #[test]
    fn test_reporting_currency_fallback() {
        let fallback = code("PLN");
        assert_eq!(Journey::new("Alps", None).reporting_currency(&fallback), fallback);
        assert_eq!(
            Journey::new("Alps", Some(code("EUR"))).reporting_currency(&fallback),
            code("EUR")
        );
    }

    #[test]
    fn test_chargeable_amount() {
        let stop = Stop::new(1, "Rome");
        assert_eq!(stop.chargeable_amount(), 0.0);
        assert_eq!(stop.clone().with_price(-5.0, None).chargeable_amount(), 0.0);
        assert_eq!(stop.with_price(120.5, None).chargeable_amount(), 120.5);
    }

    #[test]
    fn test_set_converted_roundtrips_through_accessor() {
        let mut transport = Transport::new(1, TransportType::Train, "Rome", "Milan");
        assert!(transport.converted().is_none());
        transport.set_converted(ConvertedPrice {
            amount: 42.0,
            currency: code("PLN"),
        });
        assert_eq!(transport.converted().unwrap().amount, 42.0);
        assert_eq!(transport.price_converted_currency, Some(code("PLN")));
    }

    #[test]
    fn test_legacy_rows_deserialize() {
        let raw = r#"{
            "id": 4,
            "journey_id": 2,
            "type": "hovercraft",
            "from_location": "Dover",
            "to_location": "Calais",
            "price": 30,
            "currency": ""
        }"#;
        let transport: Transport = serde_json::from_str(raw).unwrap();
        assert_eq!(transport.transport_type, TransportType::Other);
        assert_eq!(transport.price, Some(30.0));
        assert!(transport.currency.is_none());
    }

    #[test]
    fn test_untyped_columns_survive_a_roundtrip() {
        let raw = r#"{
            "id": 1,
            "journey_id": 1,
            "city": "Lyon",
            "accommodation_price": "120.50",
            "latitude": 45.76,
            "address_street": "Rue X"
        }"#;
        let stop: Stop = serde_json::from_str(raw).unwrap();
        assert_eq!(stop.accommodation_price, Some(120.5));
        assert_eq!(stop.extra.len(), 2);

        let written = serde_json::to_value(&stop).unwrap();
        assert_eq!(written["latitude"], 45.76);
        assert_eq!(written["address_street"], "Rue X");
        assert_eq!(written["city"], "Lyon");
    }
}
