use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tandem_api::{app, metrics::Metrics, worker, AppState, AuthConfig, Repositories};
use tandem_core::payment::MockPaymentGateway;
use tandem_store::{
    DbClient, InMemoryStore, PgLedgerRepository, PgOrderRepository, PgPhaseLevelRepository, PgProfileRepository,
    PgSettingsRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem_api=debug,tandem_order=info,tandem_commission=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = tandem_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tandem API on port {}", config.server.port);

    let repos = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Repositories {
                orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
                profiles: Arc::new(PgProfileRepository::new(db.pool.clone())),
                phases: Arc::new(PgPhaseLevelRepository::new(db.pool.clone())),
                ledger: Arc::new(PgLedgerRepository::new(db.pool.clone())),
                settings: Arc::new(PgSettingsRepository::new(db.pool.clone())),
            }
        }
        None => {
            tracing::warn!("No database.url configured, running on the in-memory store");
            Repositories::in_memory(InMemoryStore::new())
        }
    };

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let state = AppState::new(
        repos,
        Arc::new(MockPaymentGateway),
        metrics,
        AuthConfig { secret: config.auth.jwt_secret.clone() },
        config.payments.webhook_secret.clone(),
        config.default_app_settings(),
    );

    tokio::spawn(worker::start_commission_retry_worker(
        state.clone(),
        Duration::from_secs(config.commission.retry_interval_seconds.max(1)),
        config.commission.retry_batch_size,
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
