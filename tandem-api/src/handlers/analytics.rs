use axum::{
    extract::State,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tandem_core::repository::{LedgerRepository, OrderRepository, SettingsRepository};
use tandem_core::{AnalyticsConsent, CommissionTotals, SalesSummary};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
}

#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub sales: SalesSummary,
    pub commissions: CommissionTotals,
    pub generated_at: chrono::DateTime<Utc>,
}

/// Member-facing consent endpoints
pub fn consent_routes() -> Router<AppState> {
    Router::new().route("/api/analytics/consent", get(get_consent).post(save_consent))
}

/// Admin-only dashboard numbers
pub fn metrics_routes() -> Router<AppState> {
    Router::new().route("/api/analytics/metrics", get(dashboard_metrics))
}

async fn get_consent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AnalyticsConsent>, AppError> {
    let consent = state
        .repos
        .settings
        .get_consent(user.user_id)
        .await?
        .unwrap_or_else(|| AnalyticsConsent::denied(user.user_id));
    Ok(Json(consent))
}

async fn save_consent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ConsentRequest>,
) -> Result<Json<AnalyticsConsent>, AppError> {
    let consent = AnalyticsConsent {
        user_id: user.user_id,
        analytics: req.analytics,
        marketing: req.marketing,
        updated_at: Utc::now(),
    };
    state.repos.settings.save_consent(&consent).await?;
    Ok(Json(consent))
}

async fn dashboard_metrics(State(state): State<AppState>) -> Result<Json<DashboardMetrics>, AppError> {
    Ok(Json(DashboardMetrics {
        sales: state.repos.orders.sales_summary().await?,
        commissions: state.repos.ledger.commission_totals().await?,
        generated_at: Utc::now(),
    }))
}
