use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod security;
pub mod service;
pub mod state;

use config::{Config, StoreBackend};
use repository::Stores;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tether Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let stores = match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Database connection pool created");

            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Stores::postgres(pool)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores; state is lost on restart");
            Stores::in_memory()
        }
    };

    if config.runner_token.is_none() {
        tracing::warn!("TASK_RUNNER_TOKEN is not set; runner endpoints will refuse every request");
    }

    let addr = config.bind_addr.clone();
    let state = AppState::new(stores, config).context("Failed to initialise cursor signing")?;

    let _sweeper = service::sweeper::spawn_sweeper(state.clone());

    // Build router with all API endpoints
    let app = api::create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
