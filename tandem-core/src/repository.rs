use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use tandem_shared::Cents;

use crate::ledger::{Commission, CommissionDraft, CommissionRecording, CommissionTotals, NewWalletTransaction, Wallet, WalletTransaction};
use crate::network::{PhaseLevel, Profile, ProfileUpdate, Subscription};
use crate::order::{CommissionStatus, Order, OrderStatus, SalesSummary};
use crate::settings::{AdvertisingScript, AnalyticsConsent, AppSettings};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient funds: balance {balance_cents}, requested {requested_cents}")]
    InsufficientFunds { balance_cents: Cents, requested_cents: Cents },
    #[error("Storage error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RepoError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository trait for order data access
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist an order with its items atomically.
    /// A second order for the same gateway transaction is a `Conflict`.
    async fn create_order(&self, order: &Order) -> RepoResult<()>;

    async fn get_order(&self, id: Uuid) -> RepoResult<Option<Order>>;

    async fn find_by_transaction(&self, gateway_transaction_id: &str) -> RepoResult<Option<Order>>;

    async fn list_orders_for_user(&self, user_id: Uuid) -> RepoResult<Vec<Order>>;

    async fn list_orders_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> RepoResult<Vec<Order>>;

    /// Oldest first, so retries drain the backlog in payment order
    async fn list_by_commission_status(&self, statuses: &[CommissionStatus], limit: i64) -> RepoResult<Vec<Order>>;

    /// Compare-and-set on the fulfillment status. `Conflict` when the order
    /// is no longer in `from`.
    async fn update_status(&self, id: Uuid, from: OrderStatus, to: OrderStatus) -> RepoResult<()>;

    /// Move the commission status to `to` only while it is one of `from`.
    /// Returns whether the row changed.
    async fn update_commission_status(
        &self,
        id: Uuid,
        from: &[CommissionStatus],
        to: CommissionStatus,
    ) -> RepoResult<bool>;

    async fn sales_summary(&self) -> RepoResult<SalesSummary>;
}

/// Repository trait for profiles and their plan subscriptions
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> RepoResult<Option<Profile>>;

    async fn find_by_referral_code(&self, code: &str) -> RepoResult<Option<Profile>>;

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> RepoResult<Profile>;

    async fn count_direct_referrals(&self, sponsor_id: Uuid) -> RepoResult<i64>;

    async fn get_subscription(&self, user_id: Uuid) -> RepoResult<Option<Subscription>>;
}

#[async_trait]
pub trait PhaseLevelRepository: Send + Sync {
    async fn list_phase_levels(&self) -> RepoResult<Vec<PhaseLevel>>;

    async fn get_phase_level(&self, phase: i32) -> RepoResult<Option<PhaseLevel>>;

    async fn upsert_phase_level(&self, level: &PhaseLevel) -> RepoResult<()>;

    async fn delete_phase_level(&self, phase: i32) -> RepoResult<()>;
}

/// Wallets, wallet transactions and commission records.
///
/// Every method that moves money must apply the balance change and the
/// ledger rows in a single atomic unit.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn get_wallet(&self, user_id: Uuid) -> RepoResult<Option<Wallet>>;

    /// Newest first
    async fn list_transactions(&self, user_id: Uuid, limit: i64) -> RepoResult<Vec<WalletTransaction>>;

    /// Idempotent on `(kind, reference, user_id)`. Fails with
    /// `InsufficientFunds` when the balance would drop below zero and
    /// `allow_negative` is off.
    async fn apply_transaction(&self, tx: &NewWalletTransaction) -> RepoResult<WalletTransaction>;

    /// Insert commission rows, credit the beneficiaries' wallets and mark the
    /// order `calculated`, all in one atomic unit under the order's lock.
    ///
    /// Rows that already exist for `(order_id, beneficiary_id, level)` are
    /// skipped; only newly inserted commissions are returned. A cancelled or
    /// refunded order, or one whose commissions are already `skipped` or
    /// `reversed`, gets nothing and is closed instead.
    async fn record_commissions(
        &self,
        order_id: Uuid,
        currency: &str,
        drafts: &[CommissionDraft],
    ) -> RepoResult<CommissionRecording>;

    async fn list_commissions_for_order(&self, order_id: Uuid) -> RepoResult<Vec<Commission>>;

    /// Mark credited commissions reversed and debit them back, possibly
    /// below zero, then close the order's commission status (see
    /// `CommissionStatus::closed`) in the same atomic unit. Returns the
    /// commissions reversed by this call.
    async fn reverse_commissions(&self, order_id: Uuid, currency: &str) -> RepoResult<Vec<Commission>>;

    async fn commission_totals(&self) -> RepoResult<CommissionTotals>;
}

/// Back-office data: app settings, advertising scripts, analytics consent
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_app_settings(&self) -> RepoResult<Option<AppSettings>>;

    async fn save_app_settings(&self, settings: &AppSettings) -> RepoResult<()>;

    async fn list_scripts(&self) -> RepoResult<Vec<AdvertisingScript>>;

    async fn upsert_script(&self, script: &AdvertisingScript) -> RepoResult<()>;

    async fn delete_script(&self, id: Uuid) -> RepoResult<()>;

    async fn get_consent(&self, user_id: Uuid) -> RepoResult<Option<AnalyticsConsent>>;

    async fn save_consent(&self, consent: &AnalyticsConsent) -> RepoResult<()>;
}
