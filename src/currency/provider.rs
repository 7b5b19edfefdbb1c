//! Upstream exchange rate providers
//!
//! Each provider answers with its own payload shape; the adapters here turn
//! them all into an [`ExchangeRateSnapshot`] so nothing past this module
//! needs to know which API produced the rates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::config::CurrencyConfig;
use crate::models::{CurrencyCode, ExchangeRateSnapshot};
use crate::{PlannerError, Result};

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Latest rates with `base` as the base currency
    async fn fetch_latest(&self, base: &CurrencyCode) -> Result<ExchangeRateSnapshot>;
}

/// Picks the keyed provider when an API key is configured, the free one otherwise.
pub fn from_config(config: &CurrencyConfig) -> Result<Arc<dyn RateProvider>> {
    let retries = config.max_retries;
    match config.api_key.as_deref() {
        Some(key) => {
            info!("Using exchangerate-api.com for exchange rates");
            Ok(Arc::new(ExchangeRateApi::new(
                &config.primary_base_url,
                key,
                Duration::from_secs(config.primary_timeout_seconds.into()),
                retries,
            )?))
        }
        None => {
            info!("No exchange rate API key configured, using exchangerate.host");
            Ok(Arc::new(ExchangeRateHost::new(
                &config.fallback_base_url,
                Duration::from_secs(config.fallback_timeout_seconds.into()),
                retries,
            )?))
        }
    }
}

fn http_client(timeout: Duration, max_retries: u32) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("journey-planner/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlannerError::config(format!("Failed to create HTTP client: {e}")))?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

async fn get_json<T: DeserializeOwned>(
    client: &ClientWithMiddleware,
    provider: &'static str,
    url: &str,
) -> Result<T> {
    let start = Instant::now();
    let response = client.get(url).send().await.map_err(|e| {
        let message = send_error_message(e);
        warn!(provider, error = %message, "Exchange rate request failed");
        PlannerError::upstream(provider, None, message)
    })?;

    let status = response.status();
    debug!(
        provider,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Exchange rate response received"
    );

    if !status.is_success() {
        return Err(PlannerError::upstream(
            provider,
            Some(status.as_u16()),
            format!("Failed to fetch rates: {status}"),
        ));
    }

    response.json::<T>().await.map_err(|e| {
        PlannerError::upstream(
            provider,
            Some(status.as_u16()),
            format!("Invalid rates payload: {}", e.without_url()),
        )
    })
}

/// Error text without the request URL, which may carry an API key
fn send_error_message(error: reqwest_middleware::Error) -> String {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.without_url().to_string(),
        reqwest_middleware::Error::Middleware(_) => "request failed after retries".to_string(),
    }
}

fn normalize(
    provider: &'static str,
    base: &CurrencyCode,
    rates: BTreeMap<String, f64>,
) -> Result<ExchangeRateSnapshot> {
    if rates.is_empty() {
        return Err(PlannerError::upstream(
            provider,
            None,
            format!("No rates returned for base {base}"),
        ));
    }
    Ok(ExchangeRateSnapshot::new(base.clone(), rates))
}

/// exchangerate-api.com v6: `GET {base_url}/{key}/latest/{BASE}`
pub struct ExchangeRateApi {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateApiResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
    #[serde(default)]
    conversion_rates: BTreeMap<String, f64>,
}

impl ExchangeRateApi {
    pub const NAME: &'static str = "exchangerate-api.com";

    pub fn new(base_url: &str, api_key: &str, timeout: Duration, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, max_retries)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for ExchangeRateApi {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    // The URL carries the key, so only the base is recorded.
    #[instrument(name = "fetch_rates", skip(self, base), fields(base = %base))]
    async fn fetch_latest(&self, base: &CurrencyCode) -> Result<ExchangeRateSnapshot> {
        let url = format!(
            "{}/{}/latest/{}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            base
        );
        let body: ExchangeRateApiResponse = get_json(&self.client, Self::NAME, &url).await?;

        if body.result.as_deref() == Some("error") {
            return Err(PlannerError::upstream(
                Self::NAME,
                None,
                body.error_type.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        normalize(Self::NAME, base, body.conversion_rates)
    }
}

/// exchangerate.host: `GET {base_url}/latest?base={BASE}`, no key required
pub struct ExchangeRateHost {
    client: ClientWithMiddleware,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRateHostResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
}

impl ExchangeRateHost {
    pub const NAME: &'static str = "exchangerate.host";

    pub fn new(base_url: &str, timeout: Duration, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout, max_retries)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateProvider for ExchangeRateHost {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[instrument(name = "fetch_rates", skip(self, base), fields(base = %base))]
    async fn fetch_latest(&self, base: &CurrencyCode) -> Result<ExchangeRateSnapshot> {
        let url = format!(
            "{}/latest?base={}",
            self.base_url,
            urlencoding::encode(base.as_str())
        );
        let body: ExchangeRateHostResponse = get_json(&self.client, Self::NAME, &url).await?;

        if body.success == Some(false) {
            let message = body
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "request was not successful".to_string());
            return Err(PlannerError::upstream(Self::NAME, None, message));
        }

        normalize(Self::NAME, base, body.rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::service::tests::code;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_exchange_rate_api_parses_conversion_rates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret-key/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "base_code": "USD",
                "conversion_rates": { "USD": 1, "EUR": 0.92, "PLN": 4.01 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ExchangeRateApi::new(&server.uri(), "secret-key", timeout(), 0).unwrap();
        let snapshot = provider.fetch_latest(&code("USD")).await.unwrap();

        assert_eq!(snapshot.base, code("USD"));
        assert_eq!(snapshot.rate_for(&code("EUR")), Some(0.92));
        assert_eq!(snapshot.rate_for(&code("PLN")), Some(4.01));
    }

    #[tokio::test]
    async fn test_exchange_rate_api_error_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad-key/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "error",
                "error-type": "invalid-key"
            })))
            .mount(&server)
            .await;

        let provider = ExchangeRateApi::new(&server.uri(), "bad-key", timeout(), 0).unwrap();
        let err = provider.fetch_latest(&code("USD")).await.unwrap_err();

        match err {
            PlannerError::UpstreamFetch { message, .. } => assert_eq!(message, "invalid-key"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_host_parses_rates_and_adds_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .and(query_param("base", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "base": "EUR",
                "rates": { "USD": 1.08 }
            })))
            .mount(&server)
            .await;

        let provider = ExchangeRateHost::new(&server.uri(), timeout(), 0).unwrap();
        let snapshot = provider.fetch_latest(&code("EUR")).await.unwrap();

        assert_eq!(snapshot.rate_for(&code("USD")), Some(1.08));
        assert_eq!(snapshot.rate_for(&code("EUR")), Some(1.0));
    }

    #[tokio::test]
    async fn test_host_http_failure_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let provider = ExchangeRateHost::new(&server.uri(), timeout(), 0).unwrap();
        let err = provider.fetch_latest(&code("EUR")).await.unwrap_err();

        assert!(matches!(
            err,
            PlannerError::UpstreamFetch {
                status: Some(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_rates_are_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rates": {} })))
            .mount(&server)
            .await;

        let provider = ExchangeRateHost::new(&server.uri(), timeout(), 0).unwrap();
        assert!(provider.fetch_latest(&code("EUR")).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "rates": { "USD": 1.1 } }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let provider =
            ExchangeRateHost::new(&server.uri(), Duration::from_millis(50), 0).unwrap();
        let err = provider.fetch_latest(&code("EUR")).await.unwrap_err();

        assert!(matches!(err, PlannerError::UpstreamFetch { status: None, .. }));
    }

    #[tokio::test]
    async fn test_connection_error_does_not_expose_api_key() {
        let provider =
            ExchangeRateApi::new("http://127.0.0.1:1/v6", "SECRETKEY123", timeout(), 0).unwrap();
        let err = provider.fetch_latest(&code("USD")).await.unwrap_err();

        assert!(matches!(err, PlannerError::UpstreamFetch { status: None, .. }));
        assert!(!err.to_string().contains("SECRETKEY123"));
        assert!(!format!("{err:?}").contains("SECRETKEY123"));
    }

    #[tokio::test]
    async fn test_retried_failure_does_not_expose_api_key() {
        let provider =
            ExchangeRateApi::new("http://127.0.0.1:1/v6", "SECRETKEY123", timeout(), 1).unwrap();
        let err = provider.fetch_latest(&code("USD")).await.unwrap_err();

        assert!(!err.to_string().contains("SECRETKEY123"));
    }

    #[test]
    fn test_provider_selection() {
        let mut config = CurrencyConfig::default();
        assert_eq!(from_config(&config).unwrap().name(), ExchangeRateHost::NAME);

        config.api_key = Some("abc123".to_string());
        assert_eq!(from_config(&config).unwrap().name(), ExchangeRateApi::NAME);
    }
}
