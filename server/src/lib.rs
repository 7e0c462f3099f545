//! Vault Server - versioned document storage for vault-sync clients.
//!
//! Each authenticated user owns a collection of documents. Content is
//! opaque, usually ciphertext, and every write is guarded by an optimistic
//! version check so concurrent devices never silently overwrite each
//! other.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod repository;
pub mod routes;

use crate::config::Config;
use crate::repository::{DocumentRepository, MemoryDocumentRepository, PgDocumentRepository};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn DocumentRepository>,
    pub config: Arc<Config>,
    /// Name of the active backend, reported by `/health`
    pub storage: &'static str,
}

impl AppState {
    /// State backed by the in-memory repository.
    pub fn memory(config: Config) -> Self {
        Self {
            repo: Arc::new(MemoryDocumentRepository::new()),
            config: Arc::new(config),
            storage: "memory",
        }
    }

    /// State backed by PostgreSQL. Runs pending migrations first.
    pub async fn postgres(config: Config, database_url: &str) -> Result<Self, StartupError> {
        let pool = db::create_pool(database_url).await?;

        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;

        Ok(Self {
            repo: Arc::new(PgDocumentRepository::new(pool)),
            config: Arc::new(config),
            storage: "postgres",
        })
    }

    /// Pick the backend from the configuration.
    pub async fn from_config(config: Config) -> Result<Self, StartupError> {
        match config.database_url.clone() {
            Some(url) => Self::postgres(config, &url).await,
            None => {
                tracing::warn!("DATABASE_URL not set, documents are kept in memory");
                Ok(Self::memory(config))
            }
        }
    }
}

/// Errors raised while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
