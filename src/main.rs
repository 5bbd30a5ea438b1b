use anyhow::Context;
use log::LevelFilter;
use movie_catalog::config::{AppConfig, StoreBackend};
use movie_catalog::store::{MemoryStore, PostgresStore};
use movie_catalog::{build_app, run_server};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Info by default, sqlx quieter; RUST_LOG still wins
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    log::info!(
        "Configuration loaded: server={}, backend={:?}",
        config.server_address(),
        config.database.backend
    );

    let app = match config.database.backend {
        StoreBackend::Memory => {
            log::info!("Using in-memory store; data is lost on shutdown");
            build_app(Arc::new(MemoryStore::new()), config.pagination)
        }
        StoreBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(
                &database_url,
                config.database.max_connections.unwrap_or(10),
            )
            .await?;
            store.ensure_schema().await?;
            build_app(Arc::new(store), config.pagination)
        }
    };

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    run_server(app, listener).await
}
