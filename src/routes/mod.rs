// Route definitions

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::AppState;

// Declare submodules for different route groups
mod api;
mod images;
mod static_pages;

pub fn create_router(app_state: AppState) -> Router {
    // Leave headroom above the per-file limit so oversize uploads reach validation
    // and get a readable message instead of a bare 413.
    let upload_limit = (app_state.settings.images.max_size_mb * 4.0 * 1024.0 * 1024.0) as usize;

    let image_router = Router::new()
        .route("/validate", post(images::validate_uploads))
        .route("/compress", post(images::compress_uploads))
        .route("/preview", post(images::preview_uploads))
        .layer(DefaultBodyLimit::max(upload_limit.max(1024 * 1024)));

    let api_router = Router::new()
        .route("/vehicles", get(api::list_vehicles))
        .route("/vehicles/search", post(api::search_vehicles))
        .route("/facets", get(api::get_facets))
        .route("/facets/:field", get(api::get_facet))
        .route("/exchange-rate", get(api::get_exchange_rate))
        .route("/exchange-rate/convert", get(api::convert_amount))
        .nest("/images", image_router);

    Router::new()
        .route("/", get(static_pages::landing_page))
        .route("/stock", get(static_pages::stock_page))
        .nest("/api", api_router)
        .with_state(app_state)
}
