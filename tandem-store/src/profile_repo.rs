use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use tandem_core::repository::{PhaseLevelRepository, ProfileRepository};
use tandem_core::{PhaseLevel, Profile, ProfileUpdate, RepoError, RepoResult, Subscription};

use crate::rows::{PhaseLevelRow, ProfileRow, SubscriptionRow};

const PROFILE_COLUMNS: &str =
    "id, email, full_name, phone, referral_code, sponsor_id, role, created_at, updated_at";

pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>> {
        let sql = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        row.map(Profile::try_from).transpose()
    }

    async fn find_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>> {
        let sql = format!(
            "SELECT {} FROM profiles WHERE LOWER(referral_code) = LOWER(TRIM($1))",
            PROFILE_COLUMNS
        );
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        row.map(Profile::try_from).transpose()
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> RepoResult<Profile> {
        let sql = format!(
            "UPDATE profiles SET full_name = COALESCE($2, full_name), phone = COALESCE($3, phone), updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            PROFILE_COLUMNS
        );
        let row: Option<ProfileRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&update.full_name)
            .bind(&update.phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::backend)?;

        row.ok_or_else(|| RepoError::NotFound(format!("profile {}", id)))
            .and_then(Profile::try_from)
    }

    async fn count_direct_referrals(&self, sponsor_id: Uuid) -> RepoResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE sponsor_id = $1")
            .bind(sponsor_id)
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::backend)?;
        Ok(count)
    }

    async fn get_subscription(&self, user_id: Uuid) -> RepoResult<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT user_id, status, phase, created_at, updated_at FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        row.map(Subscription::try_from).transpose()
    }
}

pub struct PgPhaseLevelRepository {
    pool: PgPool,
}

impl PgPhaseLevelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhaseLevelRepository for PgPhaseLevelRepository {
    async fn list_phase_levels(&self) -> RepoResult<Vec<PhaseLevel>> {
        let rows: Vec<PhaseLevelRow> = sqlx::query_as(
            "SELECT phase, name, direct_rate_bps, network_rate_bps, max_depth, is_active FROM phase_levels ORDER BY phase",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(rows.into_iter().map(PhaseLevel::from).collect())
    }

    async fn get_phase_level(&self, phase: i32) -> RepoResult<Option<PhaseLevel>> {
        let row: Option<PhaseLevelRow> = sqlx::query_as(
            "SELECT phase, name, direct_rate_bps, network_rate_bps, max_depth, is_active FROM phase_levels WHERE phase = $1",
        )
        .bind(phase)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(row.map(PhaseLevel::from))
    }

    async fn upsert_phase_level(&self, level: &PhaseLevel) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO phase_levels (phase, name, direct_rate_bps, network_rate_bps, max_depth, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (phase) DO UPDATE SET
                name = EXCLUDED.name,
                direct_rate_bps = EXCLUDED.direct_rate_bps,
                network_rate_bps = EXCLUDED.network_rate_bps,
                max_depth = EXCLUDED.max_depth,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(level.phase)
        .bind(&level.name)
        .bind(level.direct_rate_bps)
        .bind(level.network_rate_bps)
        .bind(level.max_depth)
        .bind(level.is_active)
        .execute(&self.pool)
        .await
        .map_err(RepoError::backend)?;
        Ok(())
    }

    async fn delete_phase_level(&self, phase: i32) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM phase_levels WHERE phase = $1")
            .bind(phase)
            .execute(&self.pool)
            .await
            .map_err(RepoError::backend)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("phase level {}", phase)));
        }
        Ok(())
    }
}
