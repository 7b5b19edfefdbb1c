pub mod provider;
pub mod refresher;
pub mod service;

pub use provider::{ExchangeRateApi, ExchangeRateHost, RateProvider, from_config};
pub use refresher::{RateRefresher, RefreshRates, RefreshSchedule};
pub use service::CurrencyService;
