//! Row structs for runtime-checked queries and their mapping into domain types.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use tandem_core::{
    AdvertisingScript, Commission, CoreError, Order, OrderItem, PhaseLevel, Profile, RepoError, RepoResult,
    Subscription, WalletTransaction,
};
use tandem_shared::Masked;

pub(crate) fn parse<T>(value: &str) -> RepoResult<T>
where
    T: FromStr<Err = CoreError>,
{
    value.parse::<T>().map_err(RepoError::backend)
}

/// Unique violations become `Conflict`, everything else is a backend error.
pub(crate) fn map_sqlx(err: sqlx::Error, what: &str) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepoError::Conflict(format!("{} already exists", what));
        }
    }
    RepoError::backend(err)
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway: String,
    pub gateway_transaction_id: String,
    pub status: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub currency: String,
    pub affiliate_id: Option<Uuid>,
    pub shipping_address: serde_json::Value,
    pub commission_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_order(self, items: Vec<OrderItem>) -> RepoResult<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            gateway: self.gateway,
            gateway_transaction_id: self.gateway_transaction_id,
            status: parse(&self.status)?,
            subtotal_cents: self.subtotal_cents,
            shipping_cents: self.shipping_cents,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            currency: self.currency,
            affiliate_id: self.affiliate_id,
            shipping_address: self.shipping_address,
            commission_status: parse(&self.commission_status)?,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            name: row.name,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            total_cents: row.total_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProfileRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub referral_code: String,
    pub sponsor_id: Option<Uuid>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepoError;

    fn try_from(row: ProfileRow) -> RepoResult<Self> {
        Ok(Profile {
            id: row.id,
            email: Masked(row.email),
            full_name: row.full_name,
            phone: row.phone,
            referral_code: row.referral_code,
            sponsor_id: row.sponsor_id,
            role: parse(&row.role)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub user_id: Uuid,
    pub status: String,
    pub phase: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RepoError;

    fn try_from(row: SubscriptionRow) -> RepoResult<Self> {
        Ok(Subscription {
            user_id: row.user_id,
            status: parse(&row.status)?,
            phase: row.phase,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PhaseLevelRow {
    pub phase: i32,
    pub name: String,
    pub direct_rate_bps: i32,
    pub network_rate_bps: i32,
    pub max_depth: i32,
    pub is_active: bool,
}

impl From<PhaseLevelRow> for PhaseLevel {
    fn from(row: PhaseLevelRow) -> Self {
        PhaseLevel {
            phase: row.phase,
            name: row.name,
            direct_rate_bps: row.direct_rate_bps,
            network_rate_bps: row.network_rate_bps,
            max_depth: row.max_depth,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct WalletTransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WalletTransactionRow> for WalletTransaction {
    type Error = RepoError;

    fn try_from(row: WalletTransactionRow) -> RepoResult<Self> {
        Ok(WalletTransaction {
            id: row.id,
            user_id: row.user_id,
            kind: parse(&row.kind)?,
            amount_cents: row.amount_cents,
            balance_after_cents: row.balance_after_cents,
            reference: row.reference,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommissionRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub beneficiary_id: Uuid,
    pub source_user_id: Uuid,
    pub level: i32,
    pub phase: i32,
    pub rate_bps: i32,
    pub base_cents: i64,
    pub amount_cents: i64,
    pub status: String,
    pub wallet_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CommissionRow> for Commission {
    type Error = RepoError;

    fn try_from(row: CommissionRow) -> RepoResult<Self> {
        Ok(Commission {
            id: row.id,
            order_id: row.order_id,
            beneficiary_id: row.beneficiary_id,
            source_user_id: row.source_user_id,
            level: row.level,
            phase: row.phase,
            rate_bps: row.rate_bps,
            base_cents: row.base_cents,
            amount_cents: row.amount_cents,
            status: parse(&row.status)?,
            wallet_transaction_id: row.wallet_transaction_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ScriptRow {
    pub id: Uuid,
    pub name: String,
    pub placement: String,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ScriptRow> for AdvertisingScript {
    type Error = RepoError;

    fn try_from(row: ScriptRow) -> RepoResult<Self> {
        Ok(AdvertisingScript {
            id: row.id,
            name: row.name,
            placement: parse(&row.placement)?,
            content: row.content,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
