//! Journey planner core: multi-currency trip costing
//!
//! Keeps a journey's estimated total in its reporting currency up to date as
//! stops, transports and attractions change, converting prices through
//! cached exchange rates.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod currency;
pub mod error;
pub mod journey;
pub mod logging;
pub mod models;
pub mod storage;
pub mod web;

// Re-export core types for public API
pub use cache::RateCacheStore;
pub use config::PlannerConfig;
pub use context::PlannerContext;
pub use currency::{CurrencyService, RateProvider, RateRefresher};
pub use error::PlannerError;
pub use journey::{CostAggregator, CostSummary, JourneyEvent, JourneyNotifier, JourneyService};
pub use models::{
    Attraction, CurrencyCode, ExchangeRateSnapshot, Journey, Stop, Transport, TransportType,
};
pub use storage::{JsonStore, Storage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
