// JSON API: vehicle search, facets and exchange rates

use axum::{
    extract::{Json as JsonExtract, Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    currency::{self, Currency},
    error::{AppError, AppResult},
    exchange_rate::RateSource,
    filter::{self, FacetField},
    models::FilterCriteria,
};

// --- Request / Response Structs ---

#[derive(Deserialize, Debug)]
pub struct ConvertQuery {
    amount: f64,
    #[serde(default = "default_from")]
    from: Currency,
}

fn default_from() -> Currency {
    Currency::Usd
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertResponse {
    amount: f64,
    from: Currency,
    to: Currency,
    converted: f64,
    rate: f64,
    source: RateSource,
    formatted_amount: String,
    formatted_converted: String,
    error: Option<String>,
}

// --- Vehicles ---

pub async fn list_vehicles(
    State(app_state): State<AppState>,
    Query(criteria): Query<FilterCriteria>,
) -> AppResult<Response> {
    tracing::info!("[HANDLER] /api/vehicles - criteria: {:?}", criteria);
    Ok(run_filter(&app_state, &criteria))
}

pub async fn search_vehicles(
    State(app_state): State<AppState>,
    JsonExtract(criteria): JsonExtract<FilterCriteria>,
) -> AppResult<Response> {
    tracing::info!("[HANDLER] /api/vehicles/search - criteria: {:?}", criteria);
    Ok(run_filter(&app_state, &criteria))
}

fn run_filter(app_state: &AppState, criteria: &FilterCriteria) -> Response {
    let outcome = filter::filter_vehicles(&app_state.vehicles, criteria);
    tracing::debug!(total = outcome.total, count = outcome.count, "Filter applied");
    Json(outcome).into_response()
}

pub async fn get_facets(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(filter::derive_all_facets(&app_state.vehicles)))
}

pub async fn get_facet(
    State(app_state): State<AppState>,
    Path(field): Path<String>,
) -> AppResult<impl IntoResponse> {
    let field: FacetField = field.parse().map_err(|e| AppError::NotFound(format!("{}", e)))?;
    Ok(Json(filter::derive_facets(&app_state.vehicles, field)))
}

// --- Exchange rate ---

pub async fn get_exchange_rate(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    let quote = app_state.exchange_rates.get_rate().await;
    tracing::info!(rate = quote.rate, source = ?quote.source, "[HANDLER] /api/exchange-rate");
    Ok(Json(quote))
}

pub async fn convert_amount(
    State(app_state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> AppResult<impl IntoResponse> {
    if !query.amount.is_finite() {
        return Err(AppError::BadRequest("amount must be a finite number".to_string()));
    }

    let quote = app_state.exchange_rates.get_rate().await;
    let (to, converted) = match query.from {
        Currency::Usd => (Currency::Jpy, currency::convert(query.amount, quote.rate)),
        Currency::Jpy => (Currency::Usd, currency::convert_back(query.amount, quote.rate)),
    };

    Ok(Json(ConvertResponse {
        amount: query.amount,
        from: query.from,
        to,
        converted,
        rate: quote.rate,
        source: quote.source,
        formatted_amount: currency::format(query.amount, query.from),
        formatted_converted: currency::format(converted, to),
        error: quote.error,
    }))
}
