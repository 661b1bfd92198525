use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use autoexport_rust::{AppState, config, routes};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "autoexport_rust=info,tower_http=info".into())) // Default to info if RUST_LOG not set
        .with(fmt::layer())
        .init();

    tracing::info!("Initializing AutoExport server...");

    // Load configuration
    let settings = match config::Settings::new() {
        Ok(s) => {
            tracing::info!("Configuration loaded successfully.");
            s
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e); // Propagate the error
        }
    };

    // Parse the server address from settings
    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let app_state = AppState::from_settings(settings)?;

    // Warm the rate before the first page needs it; failures only degrade the quote
    let quote = app_state.exchange_rates.get_rate().await;
    tracing::info!(rate = quote.rate, source = ?quote.source, "Exchange rate ready");
    let mut refresh = app_state.exchange_rates.spawn_auto_refresh();

    let router: Router = routes::create_router(app_state);
    let app = router
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http());

    // Create a TCP listener
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => {
            tracing::info!("Server listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into()); // Convert std::io::Error to anyhow::Error
        }
    };

    // Run the server until Ctrl-C
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received.");
        })
        .await?;

    refresh.cancel();
    Ok(())
}
