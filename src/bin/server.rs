use log::{error, info, warn};
use std::net::SocketAddr;

use carehub_core::app_state::AppState;
use carehub_core::config::ServerConfig;
use carehub_core::handlers;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, access_ttl={}s, refresh_ttl={}s",
        config.host,
        config.port,
        config.access_token_ttl.as_secs(),
        config.refresh_token_ttl.as_secs()
    );

    let state = AppState::in_memory(&config);
    state.start_background_tasks();

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting CareHub server on {}", addr);
    warp::serve(handlers::routes(state)).run(addr).await;
}
