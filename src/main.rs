use anyhow::Context;
use forum_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{InMemoryRepository, PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, the data accessor and the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().context("invalid configuration")?;

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise a development-friendly default.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forum_portal=debug,tower_http=info,axum=trace".into());

    // 3. Log format by environment: pretty locally, JSON for log aggregators in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Data Accessor
    // Postgres when a database is configured, otherwise the in-memory store (local only;
    // production config refuses to load without DATABASE_URL).
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("failed to connect to Postgres, check DATABASE_URL")?;
            let postgres = PostgresRepository::new(pool);
            postgres
                .migrate()
                .await
                .context("failed to apply database migrations")?;
            tracing::info!("Using Postgres repository");
            Arc::new(postgres)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, topics and users are kept in memory");
            Arc::new(InMemoryRepository::new())
        }
    };

    // 5. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(repo, config).context("failed to build application state")?;

    // 6. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
