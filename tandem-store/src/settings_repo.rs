use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use tandem_core::repository::SettingsRepository;
use tandem_core::{AdvertisingScript, AnalyticsConsent, AppSettings, RepoError, RepoResult};

use crate::rows::ScriptRow;

pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AppSettingsRow {
    maintenance_mode: bool,
    coming_soon: bool,
    max_commission_levels: i32,
    strict_referrals: bool,
    min_payout_cents: i64,
    currency: String,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get_app_settings(&self) -> RepoResult<Option<AppSettings>> {
        let row: Option<AppSettingsRow> = sqlx::query_as(
            "SELECT maintenance_mode, coming_soon, max_commission_levels, strict_referrals, min_payout_cents, \
             currency, updated_at FROM app_settings WHERE id = TRUE",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::backend)?;

        Ok(row.map(|r| AppSettings {
            maintenance_mode: r.maintenance_mode,
            coming_soon: r.coming_soon,
            max_commission_levels: r.max_commission_levels,
            strict_referrals: r.strict_referrals,
            min_payout_cents: r.min_payout_cents,
            currency: r.currency,
            updated_at: r.updated_at,
        }))
    }

    async fn save_app_settings(&self, settings: &AppSettings) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (id, maintenance_mode, coming_soon, max_commission_levels, strict_referrals,
                                      min_payout_cents, currency, updated_at)
            VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                maintenance_mode = EXCLUDED.maintenance_mode,
                coming_soon = EXCLUDED.coming_soon,
                max_commission_levels = EXCLUDED.max_commission_levels,
                strict_referrals = EXCLUDED.strict_referrals,
                min_payout_cents = EXCLUDED.min_payout_cents,
                currency = EXCLUDED.currency,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(settings.maintenance_mode)
        .bind(settings.coming_soon)
        .bind(settings.max_commission_levels)
        .bind(settings.strict_referrals)
        .bind(settings.min_payout_cents)
        .bind(&settings.currency)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(())
    }

    async fn list_scripts(&self) -> RepoResult<Vec<AdvertisingScript>> {
        let rows: Vec<ScriptRow> = sqlx::query_as(
            "SELECT id, name, placement, content, is_active, created_at, updated_at \
             FROM advertising_scripts ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        rows.into_iter().map(AdvertisingScript::try_from).collect()
    }

    async fn upsert_script(&self, script: &AdvertisingScript) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO advertising_scripts (id, name, placement, content, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                placement = EXCLUDED.placement,
                content = EXCLUDED.content,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(script.id)
        .bind(&script.name)
        .bind(script.placement.as_str())
        .bind(&script.content)
        .bind(script.is_active)
        .bind(script.created_at)
        .bind(script.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(())
    }

    async fn delete_script(&self, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM advertising_scripts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepoError::backend)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("advertising script {}", id)));
        }
        Ok(())
    }

    async fn get_consent(&self, user_id: Uuid) -> RepoResult<Option<AnalyticsConsent>> {
        let row: Option<(Uuid, bool, bool, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, analytics, marketing, updated_at FROM analytics_consents WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::backend)?;

        Ok(row.map(|(user_id, analytics, marketing, updated_at)| AnalyticsConsent {
            user_id,
            analytics,
            marketing,
            updated_at,
        }))
    }

    async fn save_consent(&self, consent: &AnalyticsConsent) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO analytics_consents (user_id, analytics, marketing, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                analytics = EXCLUDED.analytics,
                marketing = EXCLUDED.marketing,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(consent.user_id)
        .bind(consent.analytics)
        .bind(consent.marketing)
        .bind(consent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(())
    }
}
