use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use tandem_commission::WalletPolicy;
use tandem_core::repository::{OrderRepository, PhaseLevelRepository, ProfileRepository};
use tandem_core::{Order, PhaseLevel, Profile, ProfileUpdate, Subscription, Wallet, WalletTransaction};
use tandem_order::ReferralStatus;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub profile: Profile,
    pub subscription: Option<Subscription>,
    pub phase_level: Option<PhaseLevel>,
    pub wallet: Wallet,
    pub direct_referrals: i64,
    pub order_count: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(length(min = 5, max = 32))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmRechargeRequest {
    #[validate(length(min = 1, max = 255))]
    pub gateway_transaction_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PayoutRequest {
    #[validate(range(min = 1))]
    pub amount_cents: i64,
    /// Client-generated; resubmitting the same id does not debit twice
    pub request_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet: Wallet,
    pub transactions: Vec<WalletTransaction>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/profile/summary", get(get_summary).patch(update_summary))
        .route("/api/profile/referral-status", get(referral_status))
        .route("/api/profile/recharge/confirm", post(confirm_recharge))
        .route("/api/profile/wallet", get(get_wallet))
        .route("/api/profile/payouts", post(request_payout))
        .route("/api/profile/orders", get(list_orders))
}

async fn load_profile(state: &AppState, user_id: Uuid) -> Result<Profile, AppError> {
    state
        .repos
        .profiles
        .get_profile(user_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError("Profile not found".to_string()))
}

async fn get_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileSummary>, AppError> {
    let profile = load_profile(&state, user.user_id).await?;
    let settings = state.app_settings().await?;
    let subscription = state.repos.profiles.get_subscription(user.user_id).await?;
    let phase_level = match &subscription {
        Some(sub) => state.repos.phases.get_phase_level(sub.phase).await?,
        None => None,
    };

    Ok(Json(ProfileSummary {
        wallet: state.wallet.balance(user.user_id, &settings.currency).await?,
        direct_referrals: state.repos.profiles.count_direct_referrals(user.user_id).await?,
        order_count: state.repos.orders.list_orders_for_user(user.user_id).await?.len(),
        profile,
        subscription,
        phase_level,
    }))
}

async fn update_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    req.validate()?;

    let update = ProfileUpdate {
        full_name: req.full_name.map(|n| n.trim().to_string()),
        phone: req.phone.map(|p| p.trim().to_string()),
    };
    let profile = state.repos.profiles.update_profile(user.user_id, &update).await?;
    tracing::info!(user_id = %user.user_id, email = %profile.email.hint(), "Profile updated");
    Ok(Json(profile))
}

async fn referral_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ReferralStatus>, AppError> {
    Ok(Json(state.referrals.status(user.user_id).await?))
}

async fn confirm_recharge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ConfirmRechargeRequest>,
) -> Result<Json<WalletTransaction>, AppError> {
    req.validate()?;

    let tx = state.wallet.confirm_recharge(user.user_id, &req.gateway_transaction_id).await?;
    state.metrics.wallet_recharges.inc();
    Ok(Json(tx))
}

async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<WalletResponse>, AppError> {
    let settings = state.app_settings().await?;
    Ok(Json(WalletResponse {
        wallet: state.wallet.balance(user.user_id, &settings.currency).await?,
        transactions: state.wallet.history(user.user_id, query.limit.unwrap_or(50)).await?,
    }))
}

async fn request_payout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PayoutRequest>,
) -> Result<Json<WalletTransaction>, AppError> {
    req.validate()?;

    let policy = WalletPolicy::from(&state.app_settings().await?);
    let tx = state
        .wallet
        .request_payout(user.user_id, req.amount_cents, req.request_id, &policy)
        .await?;
    Ok(Json(tx))
}

async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.repos.orders.list_orders_for_user(user.user_id).await?))
}
