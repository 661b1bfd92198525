use askama::Template;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
};

use crate::{
    AppState,
    currency::{self, Currency},
    error::AppError, // Use our custom error type
    filter::{self, FacetField},
    models::{FilterCriteria, VehicleRecord},
};

// Selector-driven fields rendered as <select> on the stock page
const SELECT_FACETS: [(FacetField, &str); 8] = [
    (FacetField::VehicleType, "Body type"),
    (FacetField::Fuel, "Fuel"),
    (FacetField::Drive, "Drive"),
    (FacetField::Transmission, "Transmission"),
    (FacetField::EngineCc, "Engine (cc)"),
    (FacetField::ExteriorColor, "Colour"),
    (FacetField::Country, "Country"),
    (FacetField::Region, "Region"),
];

struct SelectOption {
    value: String,
    selected: bool,
}

struct FacetSelect {
    name: &'static str,
    label: &'static str,
    options: Vec<SelectOption>,
}

struct TextInput {
    name: &'static str,
    label: &'static str,
    value: String,
}

struct StockRow {
    stock: String,
    title: String,
    year: String,
    mileage: String,
    price_usd: String,
    price_jpy: String,
}

#[derive(Template)]
#[template(path = "landing.html")]
struct LandingTemplate {
    vehicle_count: usize,
    makes: Vec<String>,
    rate_line: String,
}

#[derive(Template)]
#[template(path = "stock.html")]
struct StockTemplate {
    inputs: Vec<TextInput>,
    selects: Vec<FacetSelect>,
    rows: Vec<StockRow>,
    total: usize,
    count: usize,
    rate_line: String,
}

fn render<T: Template>(template: T, name: &str) -> Result<Html<String>, AppError> {
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            tracing::error!("Failed to render {} template: {}", name, e);
            Err(AppError::InternalServerError(anyhow::Error::new(e)))
        }
    }
}

fn rate_line(rate: f64, stale: bool) -> String {
    let line = format!("1 USD = ¥{:.2}", rate);
    if stale { format!("{} (offline estimate)", line) } else { line }
}

// Handler function to render the landing page
pub async fn landing_page(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let quote = app_state.exchange_rates.get_rate().await;
    let makes = filter::derive_facets(&app_state.vehicles, FacetField::Make)
        .into_iter()
        .map(|v| v.to_string())
        .collect();

    let template = LandingTemplate {
        vehicle_count: app_state.vehicles.len(),
        makes,
        rate_line: rate_line(quote.rate, quote.error.is_some()),
    };
    render(template, "landing")
}

// Handler function to render the stock search page
pub async fn stock_page(
    State(app_state): State<AppState>,
    Query(criteria): Query<FilterCriteria>,
) -> Result<impl IntoResponse, AppError> {
    let quote = app_state.exchange_rates.get_rate().await;
    let vehicles = app_state.vehicles.as_slice();
    let outcome = filter::filter_vehicles(vehicles, &criteria);
    tracing::info!(total = outcome.total, count = outcome.count, "[HANDLER] /stock");

    let selects = SELECT_FACETS
        .iter()
        .map(|&(field, label)| {
            let current = selected_value(&criteria, field);
            FacetSelect {
                name: field.as_str(),
                label,
                options: filter::derive_facets(vehicles, field)
                    .into_iter()
                    .map(|v| {
                        let value = v.to_string();
                        let selected = current.is_some_and(|c| c.trim().eq_ignore_ascii_case(&value));
                        SelectOption { value, selected }
                    })
                    .collect(),
            }
        })
        .collect();

    let rows = outcome.vehicles.iter().map(|v| stock_row(v, quote.rate)).collect();

    let template = StockTemplate {
        inputs: text_inputs(&criteria),
        selects,
        rows,
        total: outcome.total,
        count: outcome.count,
        rate_line: rate_line(quote.rate, quote.error.is_some()),
    };
    render(template, "stock")
}

fn selected_value(criteria: &FilterCriteria, field: FacetField) -> Option<&str> {
    match field {
        FacetField::VehicleType => criteria.vehicle_type.as_deref(),
        FacetField::Fuel => criteria.fuel.as_deref(),
        FacetField::Drive => criteria.drive.as_deref(),
        FacetField::Transmission => criteria.transmission.as_deref(),
        FacetField::EngineCc => criteria.engine_cc.as_deref(),
        FacetField::ExteriorColor => criteria.exterior_color.as_deref(),
        FacetField::Country => criteria.country.as_deref(),
        FacetField::Region => criteria.region.as_deref(),
        _ => None,
    }
}

fn text_inputs(criteria: &FilterCriteria) -> Vec<TextInput> {
    let input = |name, label, value: &Option<String>| TextInput {
        name,
        label,
        value: value.clone().unwrap_or_default(),
    };
    vec![
        input("keyword", "Keyword", &criteria.keyword),
        input("make", "Make", &criteria.make),
        input("model", "Model", &criteria.model),
        input("modelCode", "Model code", &criteria.model_code),
        input("yearFrom", "Year from", &criteria.year_from),
        input("yearTo", "Year to", &criteria.year_to),
        input("priceFrom", "Price from (USD)", &criteria.price_from),
        input("priceTo", "Price to (USD)", &criteria.price_to),
        input("mileageFrom", "Mileage from (km)", &criteria.mileage_from),
        input("mileageTo", "Mileage to (km)", &criteria.mileage_to),
    ]
}

fn stock_row(v: &VehicleRecord, rate: f64) -> StockRow {
    let title = v.title.clone().unwrap_or_else(|| {
        [v.make.as_deref(), v.model.as_deref()].into_iter().flatten().collect::<Vec<_>>().join(" ")
    });
    StockRow {
        stock: v.stock.clone().unwrap_or_default(),
        title,
        year: v.year.map(|y| y.to_string()).unwrap_or_default(),
        mileage: v
            .mileage
            .map(|m| format!("{} km", currency::format(m, Currency::Jpy).trim_start_matches('¥')))
            .unwrap_or_default(),
        price_usd: v.price.map(|p| currency::format(p, Currency::Usd)).unwrap_or_else(|| "ASK".to_string()),
        price_jpy: v
            .price
            .map(|p| currency::format(currency::convert(p, rate), Currency::Jpy))
            .unwrap_or_default(),
    }
}
