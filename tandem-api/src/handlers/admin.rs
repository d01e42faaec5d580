use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use tandem_commission::CommissionPlan;
use tandem_core::repository::{OrderRepository, PhaseLevelRepository, SettingsRepository};
use tandem_core::{AdvertisingScript, AppSettings, Commission, Order, OrderStatus, PhaseLevel, ScriptPlacement};
use tandem_order::{FulfillmentReport, RetrySummary, StatusChange};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AppSettingsPatch {
    pub maintenance_mode: Option<bool>,
    pub coming_soon: Option<bool>,
    #[validate(range(min = 1, max = 20))]
    pub max_commission_levels: Option<i32>,
    pub strict_referrals: Option<bool>,
    #[validate(range(min = 0))]
    pub min_payout_cents: Option<i64>,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PhaseLevelRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[validate(range(min = 0, max = 10000))]
    pub direct_rate_bps: i32,
    #[validate(range(min = 0, max = 10000))]
    pub network_rate_bps: i32,
    #[validate(range(min = 0, max = 20))]
    pub max_depth: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePhaseLevelRequest {
    pub phase: i32,
    #[serde(flatten)]
    pub level: PhaseLevelRequest,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ScriptRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub placement: ScriptPlacement,
    #[validate(length(min = 1, max = 20000))]
    pub content: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RetryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OrderCommissions {
    pub order: Order,
    pub commissions: Vec<Commission>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/app-settings", get(get_app_settings).patch(update_app_settings))
        .route("/api/admin/phase-levels", get(list_phase_levels).post(create_phase_level))
        .route("/api/admin/phase-levels/{phase}", put(update_phase_level).delete(delete_phase_level))
        .route("/api/admin/advertising-scripts", get(list_scripts).post(create_script))
        .route("/api/admin/advertising-scripts/{id}", put(update_script).delete(delete_script))
        .route("/api/admin/orders/{id}/status", patch(update_order_status))
        .route("/api/admin/orders/{id}/commissions", get(order_commissions))
        .route("/api/admin/reports/fulfillment", get(fulfillment_report))
        .route("/api/admin/commissions/retry", post(retry_commissions))
}

// ============================================================================
// App settings
// ============================================================================

async fn get_app_settings(State(state): State<AppState>) -> Result<Json<AppSettings>, AppError> {
    Ok(Json(state.app_settings().await?))
}

async fn update_app_settings(
    State(state): State<AppState>,
    Json(patch): Json<AppSettingsPatch>,
) -> Result<Json<AppSettings>, AppError> {
    patch.validate()?;

    let current = state.reload_app_settings().await?;
    let settings = AppSettings {
        maintenance_mode: patch.maintenance_mode.unwrap_or(current.maintenance_mode),
        coming_soon: patch.coming_soon.unwrap_or(current.coming_soon),
        max_commission_levels: patch.max_commission_levels.unwrap_or(current.max_commission_levels),
        strict_referrals: patch.strict_referrals.unwrap_or(current.strict_referrals),
        min_payout_cents: patch.min_payout_cents.unwrap_or(current.min_payout_cents),
        currency: patch.currency.map(|c| c.to_uppercase()).unwrap_or(current.currency),
        updated_at: Utc::now(),
    };

    state.save_app_settings(&settings).await?;
    tracing::info!(
        maintenance_mode = settings.maintenance_mode,
        coming_soon = settings.coming_soon,
        max_commission_levels = settings.max_commission_levels,
        "App settings updated"
    );
    Ok(Json(settings))
}

// ============================================================================
// Phase levels
// ============================================================================

async fn list_phase_levels(State(state): State<AppState>) -> Result<Json<Vec<PhaseLevel>>, AppError> {
    Ok(Json(state.repos.phases.list_phase_levels().await?))
}

async fn save_phase_level(state: &AppState, phase: i32, req: PhaseLevelRequest) -> Result<PhaseLevel, AppError> {
    req.validate()?;
    let level = PhaseLevel {
        phase,
        name: req.name.trim().to_string(),
        direct_rate_bps: req.direct_rate_bps,
        network_rate_bps: req.network_rate_bps,
        max_depth: req.max_depth,
        is_active: req.is_active,
    };
    level.validate()?;
    state.repos.phases.upsert_phase_level(&level).await?;
    Ok(level)
}

async fn create_phase_level(
    State(state): State<AppState>,
    Json(req): Json<CreatePhaseLevelRequest>,
) -> Result<(StatusCode, Json<PhaseLevel>), AppError> {
    if state.repos.phases.get_phase_level(req.phase).await?.is_some() {
        return Err(AppError::ConflictError(format!("Phase {} already exists", req.phase)));
    }
    let level = save_phase_level(&state, req.phase, req.level).await?;
    Ok((StatusCode::CREATED, Json(level)))
}

async fn update_phase_level(
    State(state): State<AppState>,
    Path(phase): Path<i32>,
    Json(req): Json<PhaseLevelRequest>,
) -> Result<Json<PhaseLevel>, AppError> {
    if state.repos.phases.get_phase_level(phase).await?.is_none() {
        return Err(AppError::NotFoundError(format!("Phase {} not found", phase)));
    }
    Ok(Json(save_phase_level(&state, phase, req).await?))
}

async fn delete_phase_level(State(state): State<AppState>, Path(phase): Path<i32>) -> Result<StatusCode, AppError> {
    state.repos.phases.delete_phase_level(phase).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Advertising scripts
// ============================================================================

async fn list_scripts(State(state): State<AppState>) -> Result<Json<Vec<AdvertisingScript>>, AppError> {
    Ok(Json(state.repos.settings.list_scripts().await?))
}

async fn create_script(
    State(state): State<AppState>,
    Json(req): Json<ScriptRequest>,
) -> Result<(StatusCode, Json<AdvertisingScript>), AppError> {
    req.validate()?;
    let now = Utc::now();
    let script = AdvertisingScript {
        id: Uuid::new_v4(),
        name: req.name,
        placement: req.placement,
        content: req.content,
        is_active: req.is_active,
        created_at: now,
        updated_at: now,
    };
    state.repos.settings.upsert_script(&script).await?;
    Ok((StatusCode::CREATED, Json(script)))
}

async fn update_script(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ScriptRequest>,
) -> Result<Json<AdvertisingScript>, AppError> {
    req.validate()?;
    let existing = state
        .repos
        .settings
        .list_scripts()
        .await?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| AppError::NotFoundError(format!("Advertising script {} not found", id)))?;

    let script = AdvertisingScript {
        name: req.name,
        placement: req.placement,
        content: req.content,
        is_active: req.is_active,
        updated_at: Utc::now(),
        ..existing
    };
    state.repos.settings.upsert_script(&script).await?;
    Ok(Json(script))
}

async fn delete_script(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    state.repos.settings.delete_script(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Orders & commissions
// ============================================================================

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusChange>, AppError> {
    Ok(Json(state.lifecycle.transition(id, req.status).await?))
}

async fn order_commissions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderCommissions>, AppError> {
    let order = state
        .repos
        .orders
        .get_order(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Order {} not found", id)))?;
    let commissions = state.commissions.commissions_for_order(id).await?;
    Ok(Json(OrderCommissions { order, commissions }))
}

async fn fulfillment_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or(to - Duration::days(30));
    if from >= to {
        return Err(AppError::validation("`from` must be before `to`"));
    }

    let orders = state.repos.orders.list_orders_between(from, to).await?;
    Ok(Json(FulfillmentReport::build(&orders, from, to)))
}

async fn retry_commissions(
    State(state): State<AppState>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<RetrySummary>, AppError> {
    let plan = CommissionPlan::from(&state.app_settings().await?);
    let summary = state.retrier.run_once(query.limit.unwrap_or(50).clamp(1, 500), &plan).await?;
    state.metrics.record_retry(&summary);
    Ok(Json(summary))
}
