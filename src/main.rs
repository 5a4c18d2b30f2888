use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use travis_discord_relay::error::Result;
use travis_discord_relay::forward::build_http_client;
use travis_discord_relay::signature::fetch_travis_public_key;
use travis_discord_relay::{AppState, RelayConfig, build_router, load_config, logging};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "relay_config.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config: RelayConfig = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let log_guard = match logging::setup_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging error: {}", e);
            std::process::exit(1);
        }
    };

    info!("Using config at {:?}", config_path);
    if let Err(e) = serve(config, &bind_address).await {
        error!("Relay stopped: {}", e.chain());
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn serve(config: RelayConfig, bind_address: &str) -> Result<()> {
    let http = build_http_client()?;

    let public_key = if config.signature.enabled {
        let timeout = Duration::from_secs(config.signature.key_fetch_timeout_secs);
        Some(fetch_travis_public_key(&http, &config.signature.travis_config_url, timeout).await?)
    } else {
        warn!("Signature verification is disabled; only the repository owner is checked");
        None
    };

    info!(
        "Relaying notifications from {} owner(s) to Discord",
        config.authorized_owners.len()
    );
    let state = Arc::new(AppState::new(config, public_key, http)?);
    let app = build_router(state);

    info!("Listening on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
