//! # TaskDesk API Server
//!
//! Serves the task and user roster API over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=$(openssl rand -hex 32) DATABASE_URL=postgresql://... cargo run -p taskdesk-api
//! STORAGE_BACKEND=memory JWT_SECRET=... cargo run -p taskdesk-api
//! ```

use std::sync::Arc;

use anyhow::Context;
use taskdesk_api::{
    app::{build_router, AppState},
    config::{Config, StorageBackend},
};
use taskdesk_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use taskdesk_shared::repository::{memory::MemoryRepository, postgres::PgRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "taskdesk_api=debug,taskdesk_shared=info,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    init_tracing();

    tracing::info!(
        version = taskdesk_shared::VERSION,
        storage = ?config.storage,
        "TaskDesk API server starting"
    );

    let bind_address = config.bind_address();

    let (state, pool) = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database
                .url
                .clone()
                .context("DATABASE_URL is required for the postgres backend")?;

            let pool = create_pool(DatabaseConfig::from_url(url, config.database.max_connections))
                .await
                .context("Failed to connect to database")?;
            run_migrations(&pool).await.context("Failed to run migrations")?;

            let repository = Arc::new(PgRepository::new(pool.clone()));
            (AppState::new(repository.clone(), repository, config), Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on exit");
            let repository = Arc::new(MemoryRepository::new());
            (AppState::new(repository.clone(), repository, config), None)
        }
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}
