//! Error types and handling for the journey planner

use thiserror::Error;

/// Main error type for the journey planner
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// No usable exchange rate for a currency pair
    #[error("Rate not available for {from} -> {to}")]
    RateUnavailable { from: String, to: String },

    /// Upstream rate provider failures (HTTP status or transport error)
    #[error("Upstream error from {provider}: {message}")]
    UpstreamFetch {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Aggregation requested for a journey that does not exist
    #[error("Journey {id} not found")]
    JourneyNotFound { id: i64 },

    /// Nothing cached for a base currency
    #[error("No cached rates for {base}")]
    RatesNotCached { base: String },

    /// Any other missing record
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Persistence read/write failures
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Rate cache failures
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON (de)serialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl PlannerError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn rate_unavailable(from: impl ToString, to: impl ToString) -> Self {
        Self::RateUnavailable {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an upstream error; `status` is `None` for network failures and timeouts
    pub fn upstream<P: Into<String>, S: Into<String>>(
        provider: P,
        status: Option<u16>,
        message: S,
    ) -> Self {
        Self::UpstreamFetch {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether the error means "the thing asked for does not exist"
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PlannerError::JourneyNotFound { .. }
                | PlannerError::NotFound { .. }
                | PlannerError::RatesNotCached { .. }
        )
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PlannerError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            PlannerError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            PlannerError::RateUnavailable { from, to } => {
                format!("No exchange rate is available for {from} -> {to} right now.")
            }
            PlannerError::UpstreamFetch { .. } => {
                "Unable to reach the exchange rate provider. Please try again later.".to_string()
            }
            PlannerError::JourneyNotFound { id } => format!("Journey {id} does not exist."),
            PlannerError::NotFound { entity, id } => format!("{entity} {id} does not exist."),
            PlannerError::RatesNotCached { base } => {
                format!("No exchange rates for {base} have been fetched yet.")
            }
            PlannerError::Storage { .. } | PlannerError::Serialization { .. } => {
                "Saving or loading data failed.".to_string()
            }
            PlannerError::Cache { .. } => {
                "Exchange rate cache operation failed. You may need to clear the cache."
                    .to_string()
            }
            PlannerError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}
