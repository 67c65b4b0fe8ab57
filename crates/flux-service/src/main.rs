//! Flux Service - PayPal donations and panel dispatch
//!
//! This is the main entry point for the Flux service.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flux_service::{create_router, AppState, ServerRegistry, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flux=debug,flux_service=debug,flux_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Flux Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        paypal_ipn_host = %config.paypal_ipn_host,
        donation_currency = %config.donation_currency,
        credit_exchange_rate = %config.credit_exchange_rate,
        duplicate_policy = ?config.duplicate_policy,
        use_clean_urls = config.use_clean_urls,
        server_groups = config.servers.len(),
        "Service configuration loaded"
    );

    // Connect every server group's login database
    let servers = ServerRegistry::connect(&config.servers).await?;

    let state = AppState::with_paypal(config.clone(), servers)?;
    let app = create_router(state);
    tracing::info!("Router configured with all endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
