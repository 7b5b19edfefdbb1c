use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::currency::CurrencyService;
use crate::journey::{CostSummary, JourneyService};
use crate::models::{CurrencyCode, ExchangeRateSnapshot, Journey, JourneyId};
use crate::{PlannerError, VERSION};

#[derive(Clone)]
pub struct AppState {
    pub currency: Arc<CurrencyService>,
    pub journeys: Arc<JourneyService>,
}

#[derive(Deserialize)]
pub struct BaseQuery {
    pub base: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub base: String,
}

#[derive(Deserialize)]
pub struct ConvertQuery {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

#[derive(Serialize, Deserialize)]
pub struct ConvertResponse {
    pub amount: f64,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub result: f64,
    pub rate: f64,
}

impl IntoResponse for PlannerError {
    fn into_response(self) -> Response {
        let status = match &self {
            PlannerError::Validation { .. } => StatusCode::BAD_REQUEST,
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            PlannerError::RateUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PlannerError::UpstreamFetch { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Server-side failures are logged in full; clients only see the user message.
        let body = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            json!({ "error": { "message": self.user_message() } })
        } else {
            json!({
                "error": {
                    "message": self.user_message(),
                    "detail": self.to_string(),
                }
            })
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/currency/rates", get(get_rates))
        .route("/currency/refresh", post(refresh_rates))
        .route("/currency/convert", get(convert))
        .route("/journeys", get(list_journeys))
        .route("/journeys/{id}", get(get_journey))
        .route("/journeys/{id}/recompute", post(recompute_journey))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": VERSION }))
}

/// Cached rates only, this never reaches the provider
async fn get_rates(
    State(state): State<AppState>,
    Query(query): Query<BaseQuery>,
) -> Result<Json<ExchangeRateSnapshot>, PlannerError> {
    let base = CurrencyCode::parse(&query.base)?;
    state
        .currency
        .get_cached_rates(&base)
        .await
        .map(Json)
        .ok_or_else(|| PlannerError::RatesNotCached {
            base: base.to_string(),
        })
}

async fn refresh_rates(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<ExchangeRateSnapshot>, PlannerError> {
    let base = CurrencyCode::parse(&request.base)?;
    Ok(Json(state.currency.force_refresh(&base).await?))
}

async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<ConvertResponse>, PlannerError> {
    let from = CurrencyCode::parse(&query.from)?;
    let to = CurrencyCode::parse(&query.to)?;
    if !query.amount.is_finite() {
        return Err(PlannerError::validation("amount must be a finite number"));
    }

    let rate = state.currency.get_rate(&from, &to).await?;
    Ok(Json(ConvertResponse {
        amount: query.amount,
        result: query.amount * rate,
        rate,
        from,
        to,
    }))
}

async fn list_journeys(State(state): State<AppState>) -> Result<Json<Vec<Journey>>, PlannerError> {
    Ok(Json(state.journeys.list_journeys().await?))
}

async fn get_journey(
    State(state): State<AppState>,
    Path(id): Path<JourneyId>,
) -> Result<Json<Journey>, PlannerError> {
    Ok(Json(state.journeys.get_journey(id).await?))
}

async fn recompute_journey(
    State(state): State<AppState>,
    Path(id): Path<JourneyId>,
) -> Result<Json<CostSummary>, PlannerError> {
    Ok(Json(state.journeys.recompute(id).await?))
}
