//! End-to-end tests: JSON storage on disk, the real HTTP provider against a
//! mock upstream, and the assembled web app.

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use journey_planner::{
    CurrencyCode, Journey, PlannerConfig, PlannerContext, Stop, Transport, TransportType, web,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn code(c: &str) -> CurrencyCode {
    CurrencyCode::parse(c).unwrap()
}

fn config_for(dir: &TempDir, upstream: &MockServer) -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.storage.data_dir = dir.path().join("data").to_string_lossy().into_owned();
    config.currency.cache_file = dir
        .path()
        .join("data")
        .join("exchange_rates.json")
        .to_string_lossy()
        .into_owned();
    config.currency.api_key = None;
    config.currency.fallback_base_url = upstream.uri();
    config.currency.max_retries = 0;
    config
}

async fn mount_usd_rates(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("base", "USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "base": "USD",
            "rates": { "EUR": 0.8, "PLN": 4.0, "GBP": 0.75 }
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_journey_total_follows_item_changes() {
    let dir = TempDir::new().unwrap();
    let upstream = MockServer::start().await;
    mount_usd_rates(&upstream, 1).await;
    let context = PlannerContext::from_config(config_for(&dir, &upstream)).unwrap();
    let journeys = &context.journeys;

    let journey = journeys
        .create_journey(Journey::new("Scotland", Some(code("GBP"))))
        .await
        .unwrap();
    let stop = journeys
        .create_stop(Stop::new(journey.id, "Edinburgh").with_price(400.0, Some(code("PLN"))))
        .await
        .unwrap();
    journeys
        .create_transport(
            Transport::new(journey.id, TransportType::Flight, "KRK", "EDI")
                .with_price(120.0, Some(code("GBP"))),
        )
        .await
        .unwrap();

    // 400 PLN = 100 USD = 75 GBP
    let stored = journeys.get_journey(journey.id).await.unwrap();
    assert_eq!(stored.total_estimated_cost, Some(195.0));

    journeys.delete_stop(stop.id).await.unwrap();
    let stored = journeys.get_journey(journey.id).await.unwrap();
    assert_eq!(stored.total_estimated_cost, Some(120.0));

    // Rates were cached on disk by the first conversion
    let cache = std::fs::read_to_string(dir.path().join("data").join("exchange_rates.json")).unwrap();
    let cache: Value = serde_json::from_str(&cache).unwrap();
    assert_eq!(cache["USD"]["rates"]["PLN"], 4.0);
}

#[tokio::test]
async fn test_unreachable_upstream_keeps_totals_available() {
    let dir = TempDir::new().unwrap();
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&upstream)
        .await;
    let context = PlannerContext::from_config(config_for(&dir, &upstream)).unwrap();

    let journey = context
        .journeys
        .create_journey(Journey::new("Offline", Some(code("EUR"))))
        .await
        .unwrap();
    context
        .journeys
        .create_stop(Stop::new(journey.id, "Kyoto").with_price(9000.0, Some(code("JPY"))))
        .await
        .unwrap();

    let summary = context.journeys.recompute(journey.id).await.unwrap();
    assert_eq!(summary.total, 9000.0);
    assert_eq!(summary.warnings.len(), 1);

    let snapshot = context.currency.get_rates(&code("EUR")).await;
    assert_eq!(snapshot.rates.len(), 1);
    assert!(context.currency.get_cached_rates(&code("EUR")).await.is_none());
}

#[tokio::test]
async fn test_recompute_all_over_legacy_tables() {
    let dir = TempDir::new().unwrap();
    let upstream = MockServer::start().await;
    mount_usd_rates(&upstream, 1).await;
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("journeys.json"),
        r#"[{"id": 1, "title": "Old trip", "currency": ""},
            {"id": 2, "title": "Euro trip", "currency": "EUR", "total_estimated_cost": 999}]"#,
    )
    .unwrap();
    std::fs::write(
        data.join("stops.json"),
        r#"[{"id": 1, "journey_id": 1, "city": "Poznań", "accommodation_price": 250,
             "accommodation_currency": ""},
            {"id": 2, "journey_id": 2, "city": "Nice", "accommodation_price": 80,
             "accommodation_currency": "EUR"}]"#,
    )
    .unwrap();
    std::fs::write(
        data.join("attractions.json"),
        r#"[{"id": 1, "stop_id": 2, "name": "Museum", "estimated_cost": 10, "currency": "USD"}]"#,
    )
    .unwrap();
    let context = PlannerContext::from_config(config_for(&dir, &upstream)).unwrap();

    let report = context.journeys.recompute_all().await.unwrap();

    assert!(report.failures.is_empty());
    let totals: Vec<(i64, f64, String)> = report
        .summaries
        .iter()
        .map(|s| (s.journey_id, s.total, s.currency.to_string()))
        .collect();
    // Journey 1 falls back to PLN; 10 USD = 8 EUR
    assert_eq!(
        totals,
        vec![(1, 250.0, "PLN".to_string()), (2, 88.0, "EUR".to_string())]
    );

    let attractions: Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("attractions.json")).unwrap())
            .unwrap();
    assert_eq!(attractions[0]["estimated_cost_converted"], 8.0);
    assert_eq!(attractions[0]["estimated_cost_converted_currency"], "EUR");
}

#[tokio::test]
async fn test_web_app_serves_api_routes() {
    let dir = TempDir::new().unwrap();
    let upstream = MockServer::start().await;
    mount_usd_rates(&upstream, 1).await;
    let context = PlannerContext::from_config(config_for(&dir, &upstream)).unwrap();
    let app = web::app(context.app_state(), Duration::from_secs(5));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/currency/convert?amount=20&from=GBP&to=EUR")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert!((body["result"].as_f64().unwrap() - 21.333_333).abs() < 1e-4);

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresher_populates_the_cache() {
    let dir = TempDir::new().unwrap();
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest"))
        .and(query_param("base", "PLN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rates": { "EUR": 0.23 }
        })))
        .mount(&upstream)
        .await;
    let context = PlannerContext::from_config(config_for(&dir, &upstream)).unwrap();
    let refresher = context.refresher().unwrap();

    refresher.start();
    let mut cached = None;
    for _ in 0..50 {
        cached = context.currency.get_cached_rates(&code("PLN")).await;
        if cached.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    refresher.stop().await;

    let cached = cached.expect("refresher should have cached PLN rates");
    assert_eq!(cached.rate_for(&code("EUR")), Some(0.23));
    assert!(!refresher.is_running());
}
