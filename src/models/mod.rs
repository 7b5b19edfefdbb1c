//! Data models for the journey planner
//!
//! This module contains the core domain models organized by concern:
//! - Currency: ISO codes and the defaulting rule for unset currencies
//! - Rates: cached exchange rate snapshots
//! - Journey: journeys and the priced items they own

pub mod currency;
pub mod journey;
pub mod rates;

// Re-export all public types for convenient access
pub use currency::{CurrencyCode, PIVOT_CURRENCY, effective_currency};
pub use journey::{
    Attraction, ConvertedPrice, CostBearing, ItemId, ItemKind, Journey, JourneyId, Stop,
    Transport, TransportType,
};
pub use rates::ExchangeRateSnapshot;
