use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use tandem_core::repository::SettingsRepository;
use tandem_core::{AppSettings, RepoResult};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Stored settings, or `defaults` when nothing has been saved yet
pub async fn load_app_settings(
    repo: &dyn SettingsRepository,
    defaults: &AppSettings,
) -> RepoResult<AppSettings> {
    Ok(repo.get_app_settings().await?.unwrap_or_else(|| defaults.clone()))
}
