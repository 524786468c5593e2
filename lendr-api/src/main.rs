use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use lendr_api::{app, state::{AppState, AuthConfig}};
use lendr_core::LendingRepository;
use lendr_store::{app_config::Config, DbClient, InMemoryLendingRepository, PgLendingRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lendr_api=debug,lendr_store=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Lendr API on port {}", config.server.port);

    let repo: Arc<dyn LendingRepository> = if config.database.is_in_memory() {
        tracing::warn!("database.url is empty, using the in-memory store");
        Arc::new(InMemoryLendingRepository::new())
    } else {
        let db = DbClient::new(&config.database)
            .await
            .context("Failed to connect to Postgres")?;
        if config.database.run_migrations {
            db.migrate().await.context("Failed to run migrations")?;
        }
        Arc::new(PgLendingRepository::new(db.pool))
    };

    let auth = AuthConfig::new(config.auth.api_keys.iter().cloned());
    if auth.api_keys.is_empty() {
        tracing::warn!("No API keys configured; every authenticated request will be refused");
    }

    let app = app(AppState::new(repo, auth));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
