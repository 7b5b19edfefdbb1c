//! Journey cost tracking: aggregation, mutations and change notifications

pub mod aggregator;
pub mod events;
pub mod service;

pub use aggregator::{ConversionWarning, CostAggregator, CostSummary, round_cents};
pub use events::{JourneyEvent, JourneyNotifier};
pub use service::{JourneyService, RecomputeReport};
