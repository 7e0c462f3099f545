//! Vault Server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_server::config::Config;
use vault_server::{app, AppState, StartupError};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vault_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let addr = config.bind_addr();

    tracing::info!("Starting Vault Server on {}", addr);

    let state = AppState::from_config(config).await?;
    tracing::info!(storage = state.storage, "Document storage ready");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
